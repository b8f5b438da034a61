//! Parabel-Durchhangmodell der Spannfelder.
//!
//! Läuft als zweiter Durchgang strikt nach der Vorwärts-Umwandlung, wenn alle
//! Durchgangspunkte des gesamten Baums aufgelöst sind — ein Teilbaum ergäbe
//! falsche Parameter für Felder über die unaufgelöste Grenze. Für ein Feld
//! der horizontalen Länge `L` mit konfiguriertem Durchhang `d` gilt
//! `a = 4d/L²`, `b = (z_ziel − z_start − 4d)/L`, `c = z_start` und
//! `z(s) = a·s·(L−s) + b·s + c` für `s ∈ [0, L]`. Das Vorzeichen des
//! `a`-Terms ist bewusst so festgelegt; nachgelagerte Rechnungen hängen an
//! der Feldmitte `z(L/2)` und dürfen die Konvention nicht "korrigieren".

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::config::{SagOptions, SAG_SEGMENT_RASTER, SPAN_MIN_LENGTH};
use crate::physical::{PhysicalConductor, PhysicalTree};

/// Zähler des Durchhang-Durchgangs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SagReport {
    /// Felder mit berechneten Parametern
    pub spans_computed: usize,
    /// Leiter ohne Verknüpfung (normale offene Enden)
    pub open_spans: usize,
    /// Verknüpfungen, deren Zielleiter nicht auffindbar war
    pub missing_targets: usize,
    /// Felder mit horizontaler Länge ≈ 0 (übersprungen)
    pub degenerate_spans: usize,
    /// Summe der Leiterlängen (nur bei aktivierter Profil-Abtastung)
    pub total_conductor_length: f64,
}

/// Berechnet Durchhang-Parameter für alle Leiter des Baums.
///
/// Leiter ohne Verknüpfung oder ohne auffindbares Ziel behalten
/// Null-Parameter — das sind normale Endzustände, keine Fehler — und gehen
/// nicht in die Längensumme ein.
pub fn compute_sag(tree: &mut PhysicalTree, options: &SagOptions) -> SagReport {
    let mut report = SagReport::default();

    for index in 0..tree.masts.len() {
        let Some((mast, rest)) = tree.masts[index..].split_first_mut() else {
            break;
        };
        let next_mast = rest.first();

        for level in &mut mast.levels {
            for conductor in level.left.iter_mut().chain(level.right.iter_mut()) {
                if !conductor.has_link() {
                    report.open_spans += 1;
                    continue;
                }

                let target_passage = next_mast.and_then(|next| {
                    next.conductor(conductor.link_level, conductor.link_index)
                        .map(|target| target.passage)
                });
                let Some(target_passage) = target_passage else {
                    log::warn!(
                        "Durchhang: Zielleiter (Ebene {}, Index {}) am Folgemast nicht gefunden",
                        conductor.link_level,
                        conductor.link_index
                    );
                    report.missing_targets += 1;
                    continue;
                };

                match apply_span(conductor, target_passage, options) {
                    Some(length) => {
                        report.spans_computed += 1;
                        report.total_conductor_length += length;
                    }
                    None => report.degenerate_spans += 1,
                }
            }
        }
    }

    log::info!(
        "Durchhang berechnet: {} Felder, {} offene Enden, {} fehlende Ziele, {} entartet",
        report.spans_computed,
        report.open_spans,
        report.missing_targets,
        report.degenerate_spans
    );
    report
}

/// Befüllt die Parabel-Felder eines Leiters für das Feld zu `target_passage`.
///
/// Liefert `Some(leiterlänge)` (0 ohne Abtastung) oder `None` bei entarteter
/// horizontaler Länge.
fn apply_span(
    conductor: &mut PhysicalConductor,
    target_passage: DVec3,
    options: &SagOptions,
) -> Option<f64> {
    let start = conductor.passage;
    let start_plane = start.truncate();
    let target_plane = target_passage.truncate();
    let span_length = (target_plane - start_plane).length();
    if span_length < SPAN_MIN_LENGTH {
        return None;
    }

    let sag = conductor.sag;
    let a = 4.0 * sag / (span_length * span_length);
    let b = (target_passage.z - start.z - 4.0 * sag) / span_length;
    let c = start.z;
    let z_at = |s: f64| a * s * (span_length - s) + b * s + c;

    conductor.parabola_a = a;
    conductor.parabola_b = b;
    conductor.parabola_c = c;
    conductor.span_length = span_length;

    let segment_count = ((span_length / SAG_SEGMENT_RASTER).floor() as u32).max(1);
    let segment_length = span_length / segment_count as f64;
    conductor.segment_count = segment_count;
    conductor.segment_length = segment_length;

    // Feldmitte wird unabhängig von der Abtastung immer gebraucht
    let mid_plane = start_plane.lerp(target_plane, 0.5);
    conductor.midpoint = Some(DVec3::new(
        mid_plane.x,
        mid_plane.y,
        z_at(span_length / 2.0),
    ));

    if !options.sample_profile {
        conductor.profile = Vec::new();
        conductor.conductor_length = 0.0;
        return Some(0.0);
    }

    let mut profile = Vec::with_capacity(segment_count as usize);
    for i in 0..segment_count {
        let s = i as f64 * segment_length;
        let plane = sample_plane(start_plane, target_plane, s, span_length);
        profile.push(DVec3::new(plane.x, plane.y, z_at(s)));
    }

    let mut length = 0.0;
    for pair in profile.windows(2) {
        length += pair[0].distance(pair[1]);
    }
    // Schlusssegment bis zum Zielpunkt
    if let Some(last) = profile.last() {
        length += last.distance(target_passage);
    }

    conductor.profile = profile;
    conductor.conductor_length = length;
    Some(length)
}

/// Lineare planare Interpolation zwischen den Feldenden bei Bogenparameter `s`.
fn sample_plane(start: DVec2, target: DVec2, s: f64, span_length: f64) -> DVec2 {
    start.lerp(target, s / span_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::{PhysicalLevel, PhysicalMast};
    use approx::assert_relative_eq;
    use glam::DVec2;

    /// Zwei Masten mit je einem linken Leiter; Feld L=100, gleiche Höhe z=100.
    fn baum_mit_feld(sag: f64) -> PhysicalTree {
        let mut first = leiter_mast(1, 0.0);
        let second = leiter_mast(2, 100.0);
        {
            let conductor = &mut first.levels[0].left[0];
            conductor.link_level = 1;
            conductor.link_index = -1;
            conductor.sag = sag;
        }
        PhysicalTree {
            trasse_id: 1,
            masts: vec![first, second],
        }
    }

    fn leiter_mast(pole_id: u64, east: f64) -> PhysicalMast {
        let mut level = PhysicalLevel::new(1, 30.0);
        level.left.push(PhysicalConductor::new(
            1,
            0.0,
            "Haengekette",
            DVec3::new(east, 0.0, 100.0),
        ));
        PhysicalMast {
            pole_id,
            position_gk: DVec3::new(east, 0.0, 95.0),
            position_local: DVec2::new(east / 10.0, 0.0),
            pole_height: 40.0,
            nullpoint_height: 100.0,
            orientation_local: DVec2::new(0.0, 1.0),
            orientation_gk: DVec2::new(0.0, 1.0),
            levels: vec![level],
        }
    }

    #[test]
    fn parabel_beispiel_mit_feldmitte_90() {
        // L=100, d=10, beide Enden z=100: a=0.004, b=−0.4, c=100, z(50)=90
        let mut tree = baum_mit_feld(10.0);
        let report = compute_sag(&mut tree, &SagOptions::default());
        assert_eq!(report.spans_computed, 1);

        let conductor = &tree.masts[0].levels[0].left[0];
        assert_relative_eq!(conductor.parabola_a, 0.004, epsilon = 1e-12);
        assert_relative_eq!(conductor.parabola_b, -0.4, epsilon = 1e-12);
        assert_relative_eq!(conductor.parabola_c, 100.0, epsilon = 1e-12);
        assert_relative_eq!(conductor.span_length, 100.0, epsilon = 1e-12);
        assert_eq!(conductor.segment_count, 20);
        assert_relative_eq!(conductor.segment_length, 5.0, epsilon = 1e-12);

        let midpoint = conductor.midpoint.expect("Feldmitte wird immer berechnet");
        assert_relative_eq!(midpoint.x, 50.0, epsilon = 1e-12);
        assert_relative_eq!(midpoint.z, 90.0, epsilon = 1e-12);
        // Ohne Abtastung: kein Profil, keine Längensumme
        assert!(conductor.profile.is_empty());
        assert_relative_eq!(report.total_conductor_length, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn profil_abtastung_liefert_leiterlaenge() {
        let mut tree = baum_mit_feld(10.0);
        let report = compute_sag(&mut tree, &SagOptions { sample_profile: true });

        let conductor = &tree.masts[0].levels[0].left[0];
        assert_eq!(conductor.profile.len(), 20);
        // Erster Profilpunkt = eigener Durchgangspunkt
        assert_relative_eq!(conductor.profile[0].z, 100.0, epsilon = 1e-12);
        // Durchhängender Leiter ist länger als die Sehne; das Schlusssegment
        // steigt durch die feste Vorzeichenkonvention steil zum Zielpunkt
        assert!(conductor.conductor_length > 100.0);
        assert!(conductor.conductor_length < 150.0);
        assert_relative_eq!(
            report.total_conductor_length,
            conductor.conductor_length,
            epsilon = 1e-12
        );
    }

    #[test]
    fn ohne_verknuepfung_bleiben_parameter_null() {
        let mut tree = baum_mit_feld(10.0);
        tree.masts[0].levels[0].left[0].link_index = 0;
        let report = compute_sag(&mut tree, &SagOptions { sample_profile: true });

        assert_eq!(report.spans_computed, 0);
        assert_eq!(report.open_spans, 2);
        assert_relative_eq!(report.total_conductor_length, 0.0, epsilon = 1e-12);
        let conductor = &tree.masts[0].levels[0].left[0];
        assert_eq!(conductor.span_length, 0.0);
        assert!(conductor.midpoint.is_none());
    }

    #[test]
    fn fehlendes_ziel_wird_gezaehlt_nicht_geworfen() {
        let mut tree = baum_mit_feld(10.0);
        // Zielindex existiert am Folgemast nicht
        tree.masts[0].levels[0].left[0].link_index = -3;
        let report = compute_sag(&mut tree, &SagOptions::default());

        assert_eq!(report.missing_targets, 1);
        assert_eq!(report.spans_computed, 0);
        assert_eq!(tree.masts[0].levels[0].left[0].span_length, 0.0);
    }

    #[test]
    fn entartetes_feld_wird_uebersprungen() {
        let mut tree = baum_mit_feld(10.0);
        // Beide Durchgangspunkte planar identisch
        tree.masts[1].levels[0].left[0].passage = DVec3::new(0.0, 0.0, 120.0);
        let report = compute_sag(&mut tree, &SagOptions::default());

        assert_eq!(report.degenerate_spans, 1);
        assert_eq!(report.spans_computed, 0);
    }

    #[test]
    fn kurzes_feld_hat_mindestens_ein_segment() {
        let mut tree = baum_mit_feld(0.5);
        tree.masts[1].levels[0].left[0].passage = DVec3::new(3.0, 0.0, 100.0);
        compute_sag(&mut tree, &SagOptions::default());

        let conductor = &tree.masts[0].levels[0].left[0];
        assert_eq!(conductor.segment_count, 1);
        assert_relative_eq!(conductor.segment_length, 3.0, epsilon = 1e-12);
    }
}
