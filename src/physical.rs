//! Das physikalische Berechnungsmodell: Mast → Ebene → Leiter als Baum.
//!
//! Im Gegensatz zum editierbaren Graphen sind hier alle Durchgangspunkte als
//! 3D-Koordinaten aufgelöst und Verknüpfungen als vorzeichenbehaftete Indizes
//! codiert. Dieser Baum ist die Eingabe des nachgelagerten Schallrechners.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::trasse::{AcDcKind, Side};

/// Ein Leiter am physikalischen Mast mit aufgelöstem Durchgangspunkt.
///
/// `link_index` codiert die Zielverbindung am Folgemast: negativ = linke
/// Seite, positiv = rechte Seite, Betrag = Verbindungsnummer, `0` = keine
/// Verknüpfung. Die Parabel-Felder werden erst vom Durchhangmodell befüllt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConductor {
    /// 1-basierte Nummer innerhalb der Seite
    pub connection_number: u32,
    /// Horizontaler Abstand vom Mastmittelpunkt (m)
    pub horizontal_offset: f64,
    /// Bauform der Aufhängung
    pub insulator_type: String,
    /// Aufgelöster 3D-Durchgangspunkt (GK-Ebene + Höhe)
    pub passage: DVec3,
    /// Ebene der Zielverbindung am Folgemast
    pub link_level: u32,
    /// Vorzeichenbehafteter Zielindex (negativ = links, 0 = keine Verknüpfung)
    pub link_index: i32,
    /// Konfigurierter Durchhang (m)
    pub sag: f64,
    /// Leitertyp-Name
    pub conductor_type: Option<String>,
    /// Betriebsspannung (kV)
    pub voltage: Option<f64>,
    /// Schallleistungspegel (dB(A))
    pub sound_power: Option<f64>,
    /// Strom-Art
    pub acdc: Option<AcDcKind>,

    // Vom Durchhangmodell abgeleitete Werte
    /// Parabelkoeffizient a (`z(s) = a·s·(L−s) + b·s + c`)
    pub parabola_a: f64,
    /// Parabelkoeffizient b
    pub parabola_b: f64,
    /// Parabelkoeffizient c (Höhe am eigenen Durchgangspunkt)
    pub parabola_c: f64,
    /// Horizontale Spannfeldlänge L (m)
    pub span_length: f64,
    /// Anzahl der Abtastsegmente
    pub segment_count: u32,
    /// Länge eines Abtastsegments (m)
    pub segment_length: f64,
    /// Feldmitte bei `s = L/2` (wird immer berechnet)
    pub midpoint: Option<DVec3>,
    /// Abgetastetes Höhenprofil (nur bei aktivierter Abtastung)
    pub profile: Vec<DVec3>,
    /// Leiterlänge als Summe der 3D-Segmentlängen (nur bei Abtastung)
    pub conductor_length: f64,
}

impl PhysicalConductor {
    /// Erstellt einen Leiter; alle abgeleiteten Felder bleiben null/leer.
    pub fn new(
        connection_number: u32,
        horizontal_offset: f64,
        insulator_type: impl Into<String>,
        passage: DVec3,
    ) -> Self {
        Self {
            connection_number,
            horizontal_offset,
            insulator_type: insulator_type.into(),
            passage,
            link_level: 0,
            link_index: 0,
            sag: 0.0,
            conductor_type: None,
            voltage: None,
            sound_power: None,
            acdc: None,
            parabola_a: 0.0,
            parabola_b: 0.0,
            parabola_c: 0.0,
            span_length: 0.0,
            segment_count: 0,
            segment_length: 0.0,
            midpoint: None,
            profile: Vec::new(),
            conductor_length: 0.0,
        }
    }

    /// Gibt `true` zurück, wenn der Leiter eine Zielverbindung trägt.
    pub fn has_link(&self) -> bool {
        self.link_index != 0
    }

    /// Seite der Zielverbindung, falls verknüpft.
    pub fn link_side(&self) -> Option<Side> {
        match self.link_index {
            0 => None,
            i if i < 0 => Some(Side::Left),
            _ => Some(Side::Right),
        }
    }
}

/// Eine Ebene des physikalischen Masts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalLevel {
    pub level_number: u32,
    /// Höhe der Ebene über dem Mast-Nullpunkt (m)
    pub level_height: f64,
    pub left: Vec<PhysicalConductor>,
    pub right: Vec<PhysicalConductor>,
}

impl PhysicalLevel {
    /// Erstellt eine leere Ebene.
    pub fn new(level_number: u32, level_height: f64) -> Self {
        Self {
            level_number,
            level_height,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    /// Sucht einen Leiter über den vorzeichenbehafteten Index
    /// (negativ = links, positiv = rechts, Betrag = Verbindungsnummer).
    pub fn conductor(&self, signed_index: i32) -> Option<&PhysicalConductor> {
        if signed_index == 0 {
            return None;
        }
        let list = if signed_index < 0 { &self.left } else { &self.right };
        let number = signed_index.unsigned_abs();
        list.iter().find(|c| c.connection_number == number)
    }

    /// Anzahl der Leiter beider Seiten.
    pub fn conductor_count(&self) -> usize {
        self.left.len() + self.right.len()
    }
}

/// Ein physikalischer Mast mit aufgelösten Ebenen und Leitern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalMast {
    pub pole_id: u64,
    pub position_gk: DVec3,
    pub position_local: DVec2,
    pub pole_height: f64,
    pub nullpoint_height: f64,
    pub orientation_local: DVec2,
    pub orientation_gk: DVec2,
    pub levels: Vec<PhysicalLevel>,
}

impl PhysicalMast {
    /// Sucht eine Ebene nach ihrer Nummer.
    pub fn level(&self, level_number: u32) -> Option<&PhysicalLevel> {
        self.levels.iter().find(|l| l.level_number == level_number)
    }

    /// Sucht einen Leiter über Ebene und vorzeichenbehafteten Index.
    pub fn conductor(&self, level_number: u32, signed_index: i32) -> Option<&PhysicalConductor> {
        self.level(level_number)?.conductor(signed_index)
    }

    /// Iteriert alle Leiter in deterministischer Reihenfolge
    /// (Ebenen der Reihe nach, je Ebene erst links, dann rechts).
    pub fn conductors_iter(&self) -> impl Iterator<Item = &PhysicalConductor> {
        self.levels
            .iter()
            .flat_map(|level| level.left.iter().chain(level.right.iter()))
    }

    /// Anzahl aller Leiter des Masts.
    pub fn conductor_count(&self) -> usize {
        self.levels.iter().map(PhysicalLevel::conductor_count).sum()
    }
}

/// Der vollständige physikalische Baum einer Trasse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalTree {
    pub trasse_id: u64,
    /// Masten in Trassenreihenfolge
    pub masts: Vec<PhysicalMast>,
}

impl PhysicalTree {
    /// Sucht einen Mast nach seiner Mast-ID.
    pub fn mast(&self, pole_id: u64) -> Option<&PhysicalMast> {
        self.masts.iter().find(|m| m.pole_id == pole_id)
    }

    /// Anzahl aller Leiter über alle Masten.
    pub fn conductor_count(&self) -> usize {
        self.masts.iter().map(PhysicalMast::conductor_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leiter(number: u32) -> PhysicalConductor {
        PhysicalConductor::new(number, 5.0, "Haengekette", DVec3::ZERO)
    }

    #[test]
    fn vorzeichen_index_findet_die_richtige_seite() {
        let mut level = PhysicalLevel::new(1, 20.0);
        level.left.push(leiter(1));
        level.left.push(leiter(2));
        level.right.push(leiter(1));

        assert!(level.conductor(0).is_none());
        assert_eq!(level.conductor(-2).unwrap().connection_number, 2);
        assert_eq!(level.conductor(1).unwrap().connection_number, 1);
        assert!(level.conductor(3).is_none());
        assert_eq!(level.conductor_count(), 3);
    }

    #[test]
    fn link_side_folgt_dem_vorzeichen() {
        let mut conductor = leiter(1);
        assert_eq!(conductor.link_side(), None);
        assert!(!conductor.has_link());

        conductor.link_index = -1;
        assert_eq!(conductor.link_side(), Some(crate::trasse::Side::Left));
        conductor.link_index = 2;
        assert_eq!(conductor.link_side(), Some(crate::trasse::Side::Right));
        assert!(conductor.has_link());
    }
}
