//! Ausrichtung der Masten entlang einer Trasse.
//!
//! Jeder Mast erhält einen Richtungsvektor quer zur Leitungsrichtung:
//! an den Enden die Senkrechte auf die Nachbarrichtung, in der Mitte die
//! Senkrechte auf die Winkelhalbierende der beiden Nachbarrichtungen.
//! Der Algorithmus wird identisch auf das lokale und das GK-Koordinatensystem
//! angewendet, damit beide Darstellungen konsistent bleiben.

use glam::DVec2;

use crate::config::BISECTOR_EPS;

/// Vorgabe-Ausrichtung für Einzelmasten und entartete Geometrien.
pub const DEFAULT_ORIENTATION: DVec2 = DVec2::new(0.0, 1.0);

/// Berechnet je Mastposition einen Ausrichtungsvektor (Einheitslänge).
///
/// "Senkrechte" heißt Drehung eines normierten Vektors `(x, y)` um 90° gegen
/// den Uhrzeigersinn auf `(−y, x)`. Die Funktion schlägt nie fehl und liefert
/// nie Null- oder NaN-Vektoren: zusammenfallende Nachbarn fallen auf die
/// Vorgabe-Ausrichtung `(0, 1)` zurück, nahezu entgegengesetzte
/// Nachbarrichtungen auf die Senkrechte zur Richtung zum nächsten Mast.
pub fn chain_orientations(positions: &[DVec2]) -> Vec<DVec2> {
    let n = positions.len();
    match n {
        0 => Vec::new(),
        1 => vec![DEFAULT_ORIENTATION],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    perp_of_direction(positions[0], positions[1])
                } else if i == n - 1 {
                    perp_of_direction(positions[n - 2], positions[n - 1])
                } else {
                    middle_orientation(positions[i - 1], positions[i], positions[i + 1])
                }
            })
            .collect(),
    }
}

/// Senkrechte auf die normierte Richtung `from → to`.
fn perp_of_direction(from: DVec2, to: DVec2) -> DVec2 {
    match (to - from).try_normalize() {
        Some(direction) => direction.perp(),
        None => DEFAULT_ORIENTATION,
    }
}

/// Ausrichtung eines Mittelmasts aus den Richtungen zu beiden Nachbarn.
fn middle_orientation(prev: DVec2, current: DVec2, next: DVec2) -> DVec2 {
    let to_prev = (prev - current).try_normalize();
    let to_next = (next - current).try_normalize();

    match (to_prev, to_next) {
        (Some(to_prev), Some(to_next)) => {
            let bisector = to_prev + to_next;
            if bisector.length() < BISECTOR_EPS {
                // Nachbarn nahezu kollinear: Winkelhalbierende entartet
                to_next.perp()
            } else {
                bisector.normalize().perp()
            }
        }
        // Ein Nachbar fällt mit dem Mast zusammen: verbleibende Richtung nutzen
        (None, Some(to_next)) => to_next.perp(),
        (Some(to_prev), None) => (-to_prev).perp(),
        (None, None) => DEFAULT_ORIENTATION,
    }
}
