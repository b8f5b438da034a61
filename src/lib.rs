//! Geometrie- und Gelände-Engine für die Freileitungs-Trassenplanung.
//!
//! Kernbausteine: Kalibrierung Lageplan ↔ GK-Vermessungssystem, digitales
//! Geländemodell (Delaunay) mit Höhenabfrage, Mastausrichtung entlang der
//! Trasse, Umwandlung zwischen editierbarem Trassengraphen und physikalischem
//! Mastbaum sowie das Parabel-Durchhangmodell der Spannfelder.
//! Alle Komponenten sind reine, deterministische Funktionen über
//! unveränderlichen Schnappschüssen — kein I/O, kein geteilter Zustand.

pub mod calibration;
pub mod config;
pub mod convert;
pub mod orientation;
pub mod physical;
pub mod pipeline;
pub mod sag;
pub mod terrain;
pub mod trasse;

pub use calibration::{CalibrationParameters, CalibrationTransform, ReferencePoint};
pub use config::{ConductorTypeRegistry, InsulatorTable, SagOptions};
pub use convert::{graph_to_physical, physical_to_graph, ConversionConfig, ConversionReport};
pub use orientation::chain_orientations;
pub use physical::{PhysicalConductor, PhysicalLevel, PhysicalMast, PhysicalTree};
pub use pipeline::rebuild_physical;
pub use sag::{compute_sag, SagReport};
pub use terrain::{
    HeightGrid, HeightSample, TerrainEdge, TerrainModel, TerrainPoint, TerrainTriangle,
};
pub use trasse::conn_id::{
    connection_line_id, decode_connection_id, encode_connection_id, ConnectionRef,
};
pub use trasse::{
    AcDcKind, Connection, ConnectionLine, Level, LinkValidation, Pole, Side, Trasse,
};
