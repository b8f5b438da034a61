//! Fester Berechnungs-Ablauf über unveränderliche Schnappschüsse:
//! Ausrichtungen → Vorwärts-Umwandlung → Durchhang.
//!
//! Die Reihenfolge ist verbindlich: die Ausrichtungen müssen vor der
//! Umwandlung aktuell sein, und der Durchhang darf erst laufen, wenn alle
//! Durchgangspunkte des gesamten Baums aufgelöst sind.

use anyhow::Result;

use crate::config::SagOptions;
use crate::convert::{graph_to_physical, ConversionConfig, ConversionReport};
use crate::physical::PhysicalTree;
use crate::sag::compute_sag;
use crate::trasse::Trasse;

/// Baut das physikalische Modell einer Trasse komplett neu auf.
///
/// Führt alle drei Schritte in der vorgeschriebenen Reihenfolge aus und ist
/// der empfohlene Einstiegspunkt nach jeder Änderung an Mastfolge, Positionen
/// oder Verbindungen.
pub fn rebuild_physical(
    trasse: &mut Trasse,
    config: &ConversionConfig,
    options: &SagOptions,
) -> Result<(PhysicalTree, ConversionReport)> {
    trasse.refresh_orientations();
    let (mut tree, report) = graph_to_physical(trasse, config)?;
    let sag_report = compute_sag(&mut tree, options);

    log::info!(
        "Physikalisches Modell neu aufgebaut: {} Masten, {} Leiter, {} Spannfelder",
        report.masts,
        report.conductors,
        sag_report.spans_computed
    );
    Ok((tree, report))
}
