//! Der editierbare Trassengraph: Masten, Ebenen, Verbindungen und
//! Verbindungslinien.
//!
//! Verbindungen verweisen aufeinander über deterministisch abgeleitete
//! String-IDs (siehe [`conn_id`]) statt über direkte Referenzen — zyklenfrei
//! und serialisierungsfreundlich. Jede Änderung an Mastfolge oder
//! Mastposition berechnet die Ausrichtungen beider Koordinatensysteme neu.

pub mod conn_id;

#[cfg(test)]
mod tests;

use glam::{DVec2, DVec3};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::orientation::{chain_orientations, DEFAULT_ORIENTATION};
use self::conn_id::{connection_line_id, decode_connection_id, encode_connection_id};

/// Seite eines Masts, auf der eine Verbindung hängt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Vorzeichen für den Querausleger-Versatz: +1 links, −1 rechts.
    pub fn sign(self) -> f64 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    /// Buchstabe für die ID-Codierung.
    pub fn letter(self) -> char {
        match self {
            Side::Left => 'L',
            Side::Right => 'R',
        }
    }
}

/// Strom-Art eines Leiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcDcKind {
    Ac,
    Dc,
}

/// Ein Aufhängepunkt an einer Ebene eines Masts.
///
/// `linked_connection_id` ist ein Verweis, kein Besitz: er zeigt auf eine
/// Verbindung am nächsten Mast der Trasse oder fehlt (offenes Ende). Die
/// Leiterfelder (`conductor_type`, `sag`, …) dienen als Rückfallebene für
/// Graphen ohne explizite [`ConnectionLine`]; `resolved_passage` ist eine
/// nicht-autoritative Übernahme aus der Rückumwandlung.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Deterministische ID (`M{mast}-E{ebene}-{L|R}{nr}`)
    pub id: String,
    pub pole_id: u64,
    pub level_number: u32,
    pub side: Side,
    /// 1-basierte Nummer innerhalb der Seite
    pub connection_number: u32,
    /// Horizontaler Abstand vom Mastmittelpunkt (m)
    pub horizontal_offset: f64,
    /// Bauform der Aufhängung (Schlüssel der Isolatortabelle)
    pub insulator_type: String,
    /// Verweis auf die verknüpfte Verbindung am Folgemast
    pub linked_connection_id: Option<String>,
    /// Leitertyp-Name (Rückfallebene ohne ConnectionLine)
    pub conductor_type: Option<String>,
    /// Konfigurierter Durchhang (m)
    pub sag: f64,
    /// Betriebsspannung (kV)
    pub voltage: Option<f64>,
    /// Schallleistungspegel (dB(A))
    pub sound_power: Option<f64>,
    /// Strom-Art
    pub acdc: Option<AcDcKind>,
    /// Aufgelöster 3D-Durchgangspunkt aus der Rückumwandlung
    pub resolved_passage: Option<DVec3>,
}

impl Connection {
    /// Erstellt eine Verbindung; die ID wird aus dem 4-Tupel abgeleitet.
    pub fn new(
        pole_id: u64,
        level_number: u32,
        side: Side,
        connection_number: u32,
        horizontal_offset: f64,
        insulator_type: impl Into<String>,
    ) -> Self {
        Self {
            id: encode_connection_id(pole_id, level_number, side, connection_number),
            pole_id,
            level_number,
            side,
            connection_number,
            horizontal_offset,
            insulator_type: insulator_type.into(),
            linked_connection_id: None,
            conductor_type: None,
            sag: 0.0,
            voltage: None,
            sound_power: None,
            acdc: None,
            resolved_passage: None,
        }
    }
}

/// Eine Ebene (Traverse) eines Masts; gehört ausschließlich ihrem Mast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub level_number: u32,
    /// Höhe der Ebene über dem Nullpunkt des Masts (m)
    pub level_height: f64,
    pub left_connections: Vec<Connection>,
    pub right_connections: Vec<Connection>,
}

impl Level {
    /// Erstellt eine leere Ebene.
    pub fn new(level_number: u32, level_height: f64) -> Self {
        Self {
            level_number,
            level_height,
            left_connections: Vec::new(),
            right_connections: Vec::new(),
        }
    }

    /// Verbindungen einer Seite.
    pub fn connections(&self, side: Side) -> &[Connection] {
        match side {
            Side::Left => &self.left_connections,
            Side::Right => &self.right_connections,
        }
    }

    /// Hängt eine Verbindung auf ihrer Seite an.
    pub fn add_connection(&mut self, connection: Connection) {
        match connection.side {
            Side::Left => self.left_connections.push(connection),
            Side::Right => self.right_connections.push(connection),
        }
    }

    /// Sucht eine Verbindung nach Seite und Nummer.
    pub fn connection(&self, side: Side, connection_number: u32) -> Option<&Connection> {
        self.connections(side)
            .iter()
            .find(|c| c.connection_number == connection_number)
    }

    /// Anzahl der Verbindungen beider Seiten.
    pub fn connection_count(&self) -> usize {
        self.left_connections.len() + self.right_connections.len()
    }
}

/// Ein Mast der Trasse.
///
/// Die lokale 2D-Position wird neben der GK-Position gespeichert, damit die
/// Ausrichtung in beiden Systemen unabhängig und identisch abgeleitet werden
/// kann. Die Ausrichtungen sind abgeleitete Werte und werden bei jeder
/// Änderung der Mastfolge neu berechnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pole {
    pub id: u64,
    pub trasse_id: u64,
    /// Position im GK-System mit Geländehöhe (z)
    pub position_gk: DVec3,
    /// Position im lokalen 2D-System (Pixel des Lageplans)
    pub position_local: DVec2,
    /// Gesamthöhe des Masts (m)
    pub pole_height: f64,
    /// Höhe des Mast-Nullpunkts über NN (m)
    pub nullpoint_height: f64,
    /// Abgeleitete Querausrichtung im lokalen System
    pub orientation_local: DVec2,
    /// Abgeleitete Querausrichtung im GK-System
    pub orientation_gk: DVec2,
    pub levels: Vec<Level>,
}

impl Pole {
    /// Erstellt einen Mast ohne Ebenen; Ausrichtung auf Vorgabe `(0, 1)`.
    pub fn new(
        id: u64,
        trasse_id: u64,
        position_gk: DVec3,
        position_local: DVec2,
        pole_height: f64,
        nullpoint_height: f64,
    ) -> Self {
        Self {
            id,
            trasse_id,
            position_gk,
            position_local,
            pole_height,
            nullpoint_height,
            orientation_local: DEFAULT_ORIENTATION,
            orientation_gk: DEFAULT_ORIENTATION,
            levels: Vec::new(),
        }
    }

    /// Sucht eine Ebene nach ihrer Nummer.
    pub fn level(&self, level_number: u32) -> Option<&Level> {
        self.levels.iter().find(|l| l.level_number == level_number)
    }

    /// Sucht eine Ebene nach ihrer Nummer (veränderlich).
    pub fn level_mut(&mut self, level_number: u32) -> Option<&mut Level> {
        self.levels
            .iter_mut()
            .find(|l| l.level_number == level_number)
    }

    /// Sucht eine Verbindung nach Ebene, Seite und Nummer.
    pub fn connection(
        &self,
        level_number: u32,
        side: Side,
        connection_number: u32,
    ) -> Option<&Connection> {
        self.level(level_number)?.connection(side, connection_number)
    }

    /// Iteriert alle Verbindungen in deterministischer Reihenfolge
    /// (Ebenen der Reihe nach, je Ebene erst links, dann rechts).
    pub fn connections_iter(&self) -> impl Iterator<Item = &Connection> {
        self.levels.iter().flat_map(|level| {
            level
                .left_connections
                .iter()
                .chain(level.right_connections.iter())
        })
    }

    /// Anzahl aller Verbindungen des Masts.
    pub fn connection_count(&self) -> usize {
        self.levels.iter().map(Level::connection_count).sum()
    }
}

/// Elektrisches/physikalisches Spannfeld zwischen zwei Verbindungs-IDs.
///
/// Getrennt von [`Connection`] gespeichert, damit Typinformation eindeutig
/// einem Spannfeld zugeordnet ist statt doppelt an beiden Endpunkten zu hängen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionLine {
    pub id: String,
    pub trasse_id: u64,
    pub from_connection_id: String,
    pub to_connection_id: String,
    pub conductor_type_name: String,
    /// Konfigurierter Durchhang (m)
    pub sag: f64,
    /// Betriebsspannung (kV)
    pub voltage: Option<f64>,
    /// Schallleistungspegel (dB(A))
    pub sound_power: Option<f64>,
    pub acdc: Option<AcDcKind>,
}

impl ConnectionLine {
    /// Erstellt eine Verbindungslinie; die ID wird aus den Endpunkten abgeleitet.
    pub fn new(
        trasse_id: u64,
        from_connection_id: impl Into<String>,
        to_connection_id: impl Into<String>,
        conductor_type_name: impl Into<String>,
        sag: f64,
    ) -> Self {
        let from = from_connection_id.into();
        let to = to_connection_id.into();
        Self {
            id: connection_line_id(&from, &to),
            trasse_id,
            from_connection_id: from,
            to_connection_id: to,
            conductor_type_name: conductor_type_name.into(),
            sag,
            voltage: None,
            sound_power: None,
            acdc: None,
        }
    }
}

/// Befund der Verknüpfungs-Prüfung (siehe [`Trasse::validate_links`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkValidation {
    /// IDs, die nicht parsbar sind
    pub unparsable: Vec<String>,
    /// IDs, deren Zielverbindung am Zielmast fehlt
    pub dangling: Vec<String>,
    /// IDs, deren Zielmast nicht der Folgemast in Trassenreihenfolge ist
    pub non_adjacent: Vec<String>,
}

impl LinkValidation {
    /// Gibt `true` zurück, wenn kein Befund vorliegt.
    pub fn is_ok(&self) -> bool {
        self.unparsable.is_empty() && self.dangling.is_empty() && self.non_adjacent.is_empty()
    }
}

/// Eine geordnete Leitungstrasse: Mastfolge plus Verbindungslinien.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trasse {
    pub id: u64,
    pub name: String,
    /// Masten in Trassenreihenfolge
    pub poles: Vec<Pole>,
    /// Verbindungslinien, indexiert nach ihrer ID (deterministische Reihenfolge)
    pub connection_lines: IndexMap<String, ConnectionLine>,
}

impl Trasse {
    /// Erstellt eine leere Trasse.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            poles: Vec::new(),
            connection_lines: IndexMap::new(),
        }
    }

    /// Hängt einen Mast ans Ende der Trasse und berechnet die Ausrichtungen neu.
    pub fn add_pole(&mut self, pole: Pole) {
        self.poles.push(pole);
        self.refresh_orientations();
    }

    /// Fügt einen Mast an der gegebenen Position der Mastfolge ein.
    pub fn insert_pole(&mut self, index: usize, pole: Pole) {
        let index = index.min(self.poles.len());
        self.poles.insert(index, pole);
        self.refresh_orientations();
    }

    /// Entfernt einen Mast samt Kaskade: Verbindungslinien, die ihn berühren,
    /// werden gelöscht; Verweise anderer Masten auf ihn werden gelöst.
    pub fn remove_pole(&mut self, pole_id: u64) -> Option<Pole> {
        let index = self.pole_index(pole_id)?;
        let removed = self.poles.remove(index);

        self.connection_lines.retain(|_, line| {
            !line_touches_pole(line, pole_id)
        });

        for pole in &mut self.poles {
            for level in &mut pole.levels {
                for connection in level
                    .left_connections
                    .iter_mut()
                    .chain(level.right_connections.iter_mut())
                {
                    let targets_removed = connection
                        .linked_connection_id
                        .as_deref()
                        .and_then(|id| decode_connection_id(id).ok())
                        .map(|r| r.pole_id == pole_id)
                        .unwrap_or(false);
                    if targets_removed {
                        connection.linked_connection_id = None;
                    }
                }
            }
        }

        self.refresh_orientations();
        log::info!("Mast {} entfernt, {} Masten verbleiben", pole_id, self.poles.len());
        Some(removed)
    }

    /// Verschiebt einen Mast und berechnet die Ausrichtungen neu.
    pub fn update_pole_position(
        &mut self,
        pole_id: u64,
        position_gk: DVec3,
        position_local: DVec2,
    ) -> bool {
        let Some(pole) = self.pole_mut(pole_id) else {
            return false;
        };
        pole.position_gk = position_gk;
        pole.position_local = position_local;
        self.refresh_orientations();
        true
    }

    /// Sucht einen Mast nach seiner ID.
    pub fn pole(&self, pole_id: u64) -> Option<&Pole> {
        self.poles.iter().find(|p| p.id == pole_id)
    }

    /// Sucht einen Mast nach seiner ID (veränderlich).
    pub fn pole_mut(&mut self, pole_id: u64) -> Option<&mut Pole> {
        self.poles.iter_mut().find(|p| p.id == pole_id)
    }

    /// Position eines Masts in der Trassenreihenfolge.
    pub fn pole_index(&self, pole_id: u64) -> Option<usize> {
        self.poles.iter().position(|p| p.id == pole_id)
    }

    /// Berechnet die nächste freie Mast-ID.
    pub fn next_pole_id(&self) -> u64 {
        self.poles.iter().map(|p| p.id).max().unwrap_or(0) + 1
    }

    /// Löst eine Verbindungs-ID über den Graphen auf.
    pub fn connection(&self, connection_id: &str) -> Option<&Connection> {
        let r = decode_connection_id(connection_id).ok()?;
        self.pole(r.pole_id)?
            .connection(r.level_number, r.side, r.connection_number)
    }

    /// Fügt eine Verbindungslinie hinzu (ersetzt eine gleichnamige).
    pub fn add_connection_line(&mut self, line: ConnectionLine) {
        self.connection_lines.insert(line.id.clone(), line);
    }

    /// Entfernt eine Verbindungslinie nach ihrer ID.
    pub fn remove_connection_line(&mut self, line_id: &str) -> Option<ConnectionLine> {
        self.connection_lines.shift_remove(line_id)
    }

    /// Sucht die Verbindungslinie, die an der gegebenen Verbindung beginnt.
    pub fn line_for_connection(&self, connection_id: &str) -> Option<&ConnectionLine> {
        self.connection_lines
            .values()
            .find(|line| line.from_connection_id == connection_id)
    }

    /// Anzahl der Masten.
    pub fn pole_count(&self) -> usize {
        self.poles.len()
    }

    /// Anzahl aller Verbindungen über alle Masten.
    pub fn connection_count(&self) -> usize {
        self.poles.iter().map(Pole::connection_count).sum()
    }

    /// Berechnet die Mast-Ausrichtungen beider Koordinatensysteme neu.
    ///
    /// Muss vor der Umwandlung in das physikalische Modell gelaufen sein,
    /// wann immer sich Mastfolge oder Mastpositionen geändert haben; alle
    /// verändernden Container-Operationen rufen dies bereits selbst auf.
    pub fn refresh_orientations(&mut self) {
        let local: Vec<DVec2> = self.poles.iter().map(|p| p.position_local).collect();
        let gk: Vec<DVec2> = self.poles.iter().map(|p| p.position_gk.truncate()).collect();
        let orientations_local = chain_orientations(&local);
        let orientations_gk = chain_orientations(&gk);
        for ((pole, o_local), o_gk) in self
            .poles
            .iter_mut()
            .zip(orientations_local)
            .zip(orientations_gk)
        {
            pole.orientation_local = o_local;
            pole.orientation_gk = o_gk;
        }
    }

    /// Prüft die Nachbarschafts-Invariante aller Verweise, ohne zu verändern:
    /// eine verknüpfte Verbindung muss am Folgemast der Trasse existieren.
    pub fn validate_links(&self) -> LinkValidation {
        let mut validation = LinkValidation::default();
        for (index, pole) in self.poles.iter().enumerate() {
            let next_pole = self.poles.get(index + 1);
            for connection in pole.connections_iter() {
                let Some(link_id) = connection.linked_connection_id.as_deref() else {
                    continue;
                };
                let Ok(target) = decode_connection_id(link_id) else {
                    validation.unparsable.push(link_id.to_string());
                    continue;
                };
                let adjacent = next_pole.map(|next| next.id == target.pole_id).unwrap_or(false);
                if !adjacent {
                    validation.non_adjacent.push(link_id.to_string());
                    continue;
                }
                let exists = next_pole
                    .and_then(|next| {
                        next.connection(target.level_number, target.side, target.connection_number)
                    })
                    .is_some();
                if !exists {
                    validation.dangling.push(link_id.to_string());
                }
            }
        }

        if !validation.is_ok() {
            log::warn!(
                "Verknüpfungs-Prüfung der Trasse {}: {} unparsbar, {} ohne Ziel, {} nicht benachbart",
                self.id,
                validation.unparsable.len(),
                validation.dangling.len(),
                validation.non_adjacent.len()
            );
        }
        validation
    }
}

/// Prüft, ob eine Verbindungslinie den gegebenen Mast berührt.
fn line_touches_pole(line: &ConnectionLine, pole_id: u64) -> bool {
    [&line.from_connection_id, &line.to_connection_id]
        .iter()
        .any(|id| {
            decode_connection_id(id)
                .map(|r| r.pole_id == pole_id)
                .unwrap_or(false)
        })
}
