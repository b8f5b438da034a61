//! Explizite Konfiguration der Engine: Isolatortabelle, Leitertyp-Register,
//! Durchhang-Optionen und gemeinsame numerische Toleranzen.
//!
//! Die Isolatorlängen werden bewusst als Tabelle übergeben statt hart codiert,
//! damit unbekannte Bauformen an der Grenze abgewiesen werden können.

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Toleranz für den Innen-Test der baryzentrischen Koordinaten (u,v,w ≥ −ε).
pub const BARYCENTRIC_EPS: f64 = 1e-9;

/// Unterhalb dieses Betrags gilt der Flächen-Nenner eines Dreiecks als entartet.
pub const DEGENERATE_AREA_EPS: f64 = 1e-12;

/// Unterhalb dieser Länge gilt die Winkelhalbierende zweier Richtungsvektoren
/// als entartet (nahezu entgegengesetzte Richtungen).
pub const BISECTOR_EPS: f64 = 1e-9;

/// Minimaler Maßstab `√(a²+b²)` einer gültigen Kalibrierung.
pub const MIN_CALIBRATION_SCALE: f64 = 1e-9;

/// Rasterlänge der Durchhang-Abtastung: ein Segment je 5 Längeneinheiten.
pub const SAG_SEGMENT_RASTER: f64 = 5.0;

/// Unterhalb dieser horizontalen Länge gilt ein Spannfeld als entartet.
pub const SPAN_MIN_LENGTH: f64 = 1e-6;

/// Isolatorlängen (m) je Aufhängungs-Bauform.
///
/// Ein unbekannter Typ ist ein harter Konfigurationsfehler — stilles
/// Defaulten würde die berechneten Durchgangspunkt-Höhen verfälschen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsulatorTable {
    lengths: IndexMap<String, f64>,
}

impl InsulatorTable {
    /// Leere Tabelle ohne bekannte Bauformen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Typische Bauformen als überschreibbare Vorgabewerte.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.insert("Haengekette", 4.0);
        table.insert("V-Kette", 3.5);
        table.insert("Abspannkette", 0.0);
        table.insert("Stuetzisolator", 0.0);
        table
    }

    /// Setzt oder überschreibt die Länge einer Bauform.
    pub fn insert(&mut self, insulator_type: impl Into<String>, length: f64) {
        self.lengths.insert(insulator_type.into(), length);
    }

    /// Gibt die Länge einer Bauform zurück; unbekannte Typen sind ein Fehler.
    pub fn length_of(&self, insulator_type: &str) -> Result<f64> {
        match self.lengths.get(insulator_type) {
            Some(length) => Ok(*length),
            None => {
                let known: Vec<&str> = self.lengths.keys().map(String::as_str).collect();
                bail!(
                    "Unbekannter Isolatortyp '{}' (bekannt: {})",
                    insulator_type,
                    known.join(", ")
                )
            }
        }
    }

    /// Prüft ob eine Bauform bekannt ist.
    pub fn contains(&self, insulator_type: &str) -> bool {
        self.lengths.contains_key(insulator_type)
    }

    /// Anzahl bekannter Bauformen.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Gibt `true` zurück, wenn keine Bauform bekannt ist.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

/// Leitertyp-Register: Name → Schallleistungspegel in dB(A).
///
/// Wird beim Umwandeln als Rückfallebene benutzt, wenn weder die
/// Verbindungslinie noch die Verbindung selbst einen Pegel trägt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConductorTypeRegistry {
    sound_power: IndexMap<String, f64>,
}

impl ConductorTypeRegistry {
    /// Leeres Register.
    pub fn new() -> Self {
        Self::default()
    }

    /// Setzt oder überschreibt den Schallleistungspegel eines Leitertyps.
    pub fn insert(&mut self, name: impl Into<String>, sound_power_level: f64) {
        self.sound_power.insert(name.into(), sound_power_level);
    }

    /// Gibt den Pegel eines Leitertyps zurück, falls bekannt.
    pub fn sound_power_of(&self, name: &str) -> Option<f64> {
        self.sound_power.get(name).copied()
    }

    /// Lädt das Register aus einem JSON-Objekt (`{"Name": pegel, ...}`).
    ///
    /// Die Engine liest selbst keine Dateien; der Aufrufer liefert den Inhalt.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let sound_power: IndexMap<String, f64> =
            serde_json::from_str(json).context("Leitertyp-Register: ungültiges JSON")?;
        Ok(Self { sound_power })
    }

    /// Anzahl registrierter Leitertypen.
    pub fn len(&self) -> usize {
        self.sound_power.len()
    }

    /// Gibt `true` zurück, wenn kein Leitertyp registriert ist.
    pub fn is_empty(&self) -> bool {
        self.sound_power.is_empty()
    }
}

/// Optionen der Durchhang-Berechnung.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagOptions {
    /// Tastet das Höhenprofil jedes Spannfelds ab und summiert die Leiterlänge.
    /// Der Mittelpunkt wird unabhängig davon immer berechnet.
    pub sample_profile: bool,
}
