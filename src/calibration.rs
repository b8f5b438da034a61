//! Kalibrierung zwischen GK-Vermessungskoordinaten und Pixelkoordinaten des Lageplans.
//!
//! Aus den Referenzpunkten wird eine konforme 2D-Abbildung (4-Parameter-
//! Helmert-Transformation) per Ausgleichsrechnung bestimmt:
//! `pixel_x = a·ost + b·nord + c` und `pixel_y = −b·ost + a·nord + d`.
//! Bei mehr als zwei Punkten ergibt sich die beste Anpassung im Sinne der
//! kleinsten Quadrate; ein singuläres Normalgleichungssystem fällt auf die
//! Moore-Penrose-Pseudoinverse zurück.

use anyhow::{bail, Result};
use glam::DVec2;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::MIN_CALIBRATION_SCALE;

/// Vom Benutzer gesetzter Kalibrier-Anker (Pixel ↔ GK), unveränderlich nach Anlage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    /// X-Koordinate im Bild (Pixel)
    pub pixel_x: f64,
    /// Y-Koordinate im Bild (Pixel)
    pub pixel_y: f64,
    /// GK-Rechtswert (Ost)
    pub gk_easting: f64,
    /// GK-Hochwert (Nord)
    pub gk_northing: f64,
    /// Freie Beschriftung des Punkts
    pub label: String,
}

impl ReferencePoint {
    /// Erstellt einen neuen Referenzpunkt.
    pub fn new(
        pixel_x: f64,
        pixel_y: f64,
        gk_easting: f64,
        gk_northing: f64,
        label: impl Into<String>,
    ) -> Self {
        Self {
            pixel_x,
            pixel_y,
            gk_easting,
            gk_northing,
            label: label.into(),
        }
    }

    /// GK-Position als Vektor.
    pub fn gk(&self) -> DVec2 {
        DVec2::new(self.gk_easting, self.gk_northing)
    }

    /// Pixel-Position als Vektor.
    pub fn pixel(&self) -> DVec2 {
        DVec2::new(self.pixel_x, self.pixel_y)
    }
}

/// Konforme Abbildung GK → Pixel mit den Parametern `(a, b, c, d)`.
///
/// Wird bei jeder Änderung der Referenzpunktmenge neu abgeleitet,
/// nie in-place verändert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTransform {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

/// Ausgewertete Parameter der Kalibrierung für die Anzeige.
///
/// Winkel nur an dieser Meldegrenze in Grad; intern wird im Bogenmaß gerechnet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationParameters {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    /// Maßstab `√(a²+b²)` (Pixel je GK-Längeneinheit)
    pub scale: f64,
    /// Drehwinkel `atan2(−b, a)` in Grad
    pub rotation_degrees: f64,
}

impl CalibrationTransform {
    /// Bestimmt die Transformation aus mindestens 2 Referenzpunkten.
    ///
    /// Je Punkt entstehen zwei Zeilen des Systems `A·x = b` mit den
    /// Unbekannten `(a, b, c, d)`; gelöst wird über die Normalgleichungen
    /// `AᵗA·x = Aᵗb`. Ist `AᵗA` singulär (z.B. doppelte Punkte), wird die
    /// Pseudoinverse per SVD verwendet. Fallen alle GK-Positionen zusammen,
    /// schlägt die Konstruktion fehl — `forward`/`inverse` sind danach
    /// garantiert aufrufbar.
    pub fn from_reference_points(points: &[ReferencePoint]) -> Result<Self> {
        if points.len() < 2 {
            bail!(
                "Kalibrierung benötigt mindestens 2 Referenzpunkte, erhalten: {}",
                points.len()
            );
        }
        for point in points {
            if !point.pixel_x.is_finite()
                || !point.pixel_y.is_finite()
                || !point.gk_easting.is_finite()
                || !point.gk_northing.is_finite()
            {
                bail!("Referenzpunkt '{}' enthält ungültige Koordinaten", point.label);
            }
        }
        let distinct = points
            .iter()
            .map(|p| (p.gk_easting.to_bits(), p.gk_northing.to_bits()))
            .collect::<std::collections::HashSet<_>>();
        if distinct.len() < 2 {
            bail!("Kalibrierung benötigt mindestens 2 verschiedene GK-Positionen");
        }

        let rows = points.len() * 2;
        let mut matrix = DMatrix::<f64>::zeros(rows, 4);
        let mut rhs = DVector::<f64>::zeros(rows);
        for (i, point) in points.iter().enumerate() {
            let rx = 2 * i;
            let ry = rx + 1;
            // pixel_x = a·ost + b·nord + c
            matrix[(rx, 0)] = point.gk_easting;
            matrix[(rx, 1)] = point.gk_northing;
            matrix[(rx, 2)] = 1.0;
            rhs[rx] = point.pixel_x;
            // pixel_y = −b·ost + a·nord + d
            matrix[(ry, 0)] = point.gk_northing;
            matrix[(ry, 1)] = -point.gk_easting;
            matrix[(ry, 3)] = 1.0;
            rhs[ry] = point.pixel_y;
        }

        let ata = matrix.transpose() * &matrix;
        let atb = matrix.transpose() * &rhs;
        let normal_solution = ata
            .lu()
            .solve(&atb)
            .filter(|solution| solution.iter().all(|v| v.is_finite()));
        let solution = match normal_solution {
            Some(solution) => solution,
            None => {
                log::warn!(
                    "Normalgleichungen singulär, weiche auf Pseudoinverse aus ({} Referenzpunkte)",
                    points.len()
                );
                Self::solve_pseudo_inverse(&matrix, &rhs)?
            }
        };

        let (a, b, c, d) = (solution[0], solution[1], solution[2], solution[3]);
        if a * a + b * b < MIN_CALIBRATION_SCALE * MIN_CALIBRATION_SCALE {
            bail!("Kalibrierung entartet: Maßstab nahezu null (fallen die Referenzpunkte zusammen?)");
        }

        log::info!(
            "Kalibrierung bestimmt aus {} Referenzpunkten: Maßstab {:.6}, Drehung {:.3}°",
            points.len(),
            (a * a + b * b).sqrt(),
            (-b).atan2(a).to_degrees()
        );

        Ok(Self { a, b, c, d })
    }

    /// Legacy-Komfortform: Transformation aus genau zwei Referenzpunkten.
    pub fn from_two_points(first: &ReferencePoint, second: &ReferencePoint) -> Result<Self> {
        Self::from_reference_points(&[first.clone(), second.clone()])
    }

    /// Kleinste-Quadrate-Lösung über die Moore-Penrose-Pseudoinverse.
    fn solve_pseudo_inverse(matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let svd = matrix.clone().svd(true, true);
        // Abschneidegrenze relativ zum größten Singulärwert
        let cutoff = svd.singular_values.max() * 1e-12;
        svd.solve(rhs, cutoff)
            .map_err(|err| anyhow::anyhow!("SVD-Lösung fehlgeschlagen: {err}"))
    }

    /// Bildet eine GK-Position auf Pixelkoordinaten ab.
    pub fn forward(&self, gk: DVec2) -> DVec2 {
        DVec2::new(
            self.a * gk.x + self.b * gk.y + self.c,
            -self.b * gk.x + self.a * gk.y + self.d,
        )
    }

    /// Bildet Pixelkoordinaten zurück auf die GK-Position.
    ///
    /// Geschlossene Form: Inversion des 2×2-Rotations-Maßstab-Blocks
    /// `[[a, b], [−b, a]]` mit Determinante `a²+b²` (durch die Konstruktion
    /// von null verschieden).
    pub fn inverse(&self, pixel: DVec2) -> DVec2 {
        let dx = pixel.x - self.c;
        let dy = pixel.y - self.d;
        let det = self.a * self.a + self.b * self.b;
        DVec2::new(
            (self.a * dx - self.b * dy) / det,
            (self.b * dx + self.a * dy) / det,
        )
    }

    /// Gibt die ausgewerteten Parameter zurück.
    pub fn parameters(&self) -> CalibrationParameters {
        CalibrationParameters {
            a: self.a,
            b: self.b,
            c: self.c,
            d: self.d,
            scale: (self.a * self.a + self.b * self.b).sqrt(),
            rotation_degrees: (-self.b).atan2(self.a).to_degrees(),
        }
    }
}
