//! Digitales Geländemodell: Delaunay-Triangulation von Höhenpunkten mit
//! baryzentrischer Höheninterpolation.
//!
//! Vor der Triangulation werden die Koordinaten um das Minimum von
//! Rechts-/Hochwert verschoben — bei GK-Beträgen um 3,5·10⁶ eine notwendige
//! Stabilisierung. Abfragen außerhalb der konvexen Hülle fallen auf den
//! Mittelwert des Dreiecks mit dem nächstgelegenen Schwerpunkt zurück;
//! das ist eine Näherung, keine echte Extrapolation, und wird im Ergebnis
//! über das `extrapolated`-Flag kenntlich gemacht.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Result};
use glam::DVec2;
use kiddo::{KdTree, SquaredEuclidean};
use serde::{Deserialize, Serialize};
use spade::{DelaunayTriangulation, Point2, Triangulation};

use crate::config::{BARYCENTRIC_EPS, DEGENERATE_AREA_EPS};

/// Vermessener Höhenpunkt; unveränderliche Stichprobe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainPoint {
    /// Eindeutige ID des Punkts
    pub id: u64,
    /// GK-Rechtswert (Ost)
    pub gk_easting: f64,
    /// GK-Hochwert (Nord)
    pub gk_northing: f64,
    /// Geländehöhe (m)
    pub elevation: f64,
}

impl TerrainPoint {
    /// Erstellt einen neuen Höhenpunkt.
    pub fn new(id: u64, gk_easting: f64, gk_northing: f64, elevation: f64) -> Self {
        Self {
            id,
            gk_easting,
            gk_northing,
            elevation,
        }
    }

    /// Planare GK-Position als Vektor.
    pub fn gk(&self) -> DVec2 {
        DVec2::new(self.gk_easting, self.gk_northing)
    }
}

/// Dreieck der Triangulation; referenziert Punkte nur über ihre IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainTriangle {
    /// IDs der drei Eckpunkte
    pub point_ids: [u64; 3],
}

/// Kante der Triangulation mit bis zu 2 angrenzenden Dreiecken (−1 = Rand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainEdge {
    /// IDs der beiden Endpunkte (aufsteigend sortiert)
    pub point_ids: [u64; 2],
    /// Indizes der angrenzenden Dreiecke, −1 für Randkanten
    pub triangle_indices: [i32; 2],
}

/// Ergebnis einer Höhenabfrage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightSample {
    /// Interpolierte bzw. genäherte Geländehöhe (m)
    pub elevation: f64,
    /// `true`, wenn der Punkt außerhalb der konvexen Hülle lag und die Höhe
    /// nur über den nächstgelegenen Dreiecksschwerpunkt genähert wurde
    pub extrapolated: bool,
}

/// Regelmäßig abgetastetes Höhenraster in Pixelkoordinaten.
#[derive(Debug, Clone)]
pub struct HeightGrid {
    /// Rasterbreite in Zellen
    pub width: usize,
    /// Rasterhöhe in Zellen
    pub height: usize,
    /// Zellgröße in Pixeln
    pub cell_size: f64,
    cells: Vec<Option<HeightSample>>,
}

impl HeightGrid {
    /// Gibt die Höhenprobe einer Zelle zurück (`None` = nicht befüllbar).
    pub fn at(&self, ix: usize, iy: usize) -> Option<HeightSample> {
        if ix >= self.width || iy >= self.height {
            return None;
        }
        self.cells[iy * self.width + ix]
    }

    /// Anzahl befüllter Zellen.
    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

/// Digitales Geländemodell über einer festen Punktmenge.
///
/// Dreiecke und Kanten werden immer gemeinsam abgeleitet; bei Änderungen an
/// der Punktmenge wird das Modell komplett neu aufgebaut, nie inkrementell
/// fortgeschrieben.
#[derive(Debug, Clone)]
pub struct TerrainModel {
    points: Vec<TerrainPoint>,
    /// Verschiebung (min. Rechtswert, min. Hochwert) vor der Triangulation
    offset: DVec2,
    /// Normalisierte planare Positionen, parallel zu `points`
    norm_positions: Vec<DVec2>,
    triangles: Vec<TerrainTriangle>,
    edges: Vec<TerrainEdge>,
    /// Punktindizes je Dreieck, parallel zu `triangles`
    triangle_vertices: Vec<[usize; 3]>,
    /// Normalisierte Schwerpunkte, parallel zu `triangles`
    centroids: Vec<DVec2>,
    centroid_tree: KdTree<f64, 2>,
}

impl TerrainModel {
    /// Baut das Modell aus den übergebenen Höhenpunkten auf.
    ///
    /// Weniger als 3 Punkte ergeben ein leeres, abfragbares Modell (alle
    /// Abfragen `None`) — kein Fehler. Exakt doppelte Positionen werden mit
    /// Warnung übersprungen; kollineare Punktmengen ergeben ein Modell ohne
    /// Dreiecke. Nicht-endliche Koordinaten sind ein Fehler.
    pub fn build(points: Vec<TerrainPoint>) -> Result<Self> {
        for point in &points {
            if !point.gk_easting.is_finite()
                || !point.gk_northing.is_finite()
                || !point.elevation.is_finite()
            {
                bail!("Geländepunkt {} enthält ungültige Koordinaten", point.id);
            }
        }

        if points.len() < 3 {
            log::info!(
                "Geländemodell leer: nur {} Höhenpunkte (mindestens 3 nötig)",
                points.len()
            );
            return Ok(Self::empty_with_points(points));
        }

        let offset = DVec2::new(
            points
                .iter()
                .map(|p| p.gk_easting)
                .fold(f64::INFINITY, f64::min),
            points
                .iter()
                .map(|p| p.gk_northing)
                .fold(f64::INFINITY, f64::min),
        );
        let norm_positions: Vec<DVec2> = points.iter().map(|p| p.gk() - offset).collect();

        // Exakt doppelte Positionen vor dem Einfügen aussortieren
        let mut seen: HashMap<(u64, u64), u64> = HashMap::new();
        let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
        let mut vertex_to_point: Vec<usize> = Vec::with_capacity(points.len());
        for (index, pos) in norm_positions.iter().enumerate() {
            let key = (pos.x.to_bits(), pos.y.to_bits());
            if let Some(first_id) = seen.get(&key) {
                log::warn!(
                    "Doppelter Geländepunkt {} (gleiche Position wie Punkt {}) wird übersprungen",
                    points[index].id,
                    first_id
                );
                continue;
            }
            seen.insert(key, points[index].id);

            let handle = triangulation
                .insert(Point2::new(pos.x, pos.y))
                .map_err(|err| {
                    anyhow!("Triangulation: Punkt {} nicht einfügbar: {err:?}", points[index].id)
                })?;
            debug_assert_eq!(handle.index(), vertex_to_point.len());
            vertex_to_point.push(index);
        }

        let mut triangles = Vec::new();
        let mut triangle_vertices = Vec::new();
        let mut centroids = Vec::new();
        for face in triangulation.inner_faces() {
            let idx = face.vertices().map(|v| vertex_to_point[v.fix().index()]);
            triangles.push(TerrainTriangle {
                point_ids: [points[idx[0]].id, points[idx[1]].id, points[idx[2]].id],
            });
            let centroid =
                (norm_positions[idx[0]] + norm_positions[idx[1]] + norm_positions[idx[2]]) / 3.0;
            centroids.push(centroid);
            triangle_vertices.push(idx);
        }

        if triangles.is_empty() {
            log::info!(
                "Geländemodell ohne Dreiecke: {} Punkte sind kollinear",
                points.len()
            );
        }

        let edges = Self::derive_edges(&triangles);
        let centroid_entries: Vec<[f64; 2]> = centroids.iter().map(|c| [c.x, c.y]).collect();
        let centroid_tree: KdTree<f64, 2> = (&centroid_entries).into();

        log::info!(
            "Geländemodell aufgebaut: {} Punkte, {} Dreiecke, {} Kanten",
            points.len(),
            triangles.len(),
            edges.len()
        );

        Ok(Self {
            points,
            offset,
            norm_positions,
            triangles,
            edges,
            triangle_vertices,
            centroids,
            centroid_tree,
        })
    }

    fn empty_with_points(points: Vec<TerrainPoint>) -> Self {
        let norm_positions = points.iter().map(|p| p.gk()).collect();
        Self {
            points,
            offset: DVec2::ZERO,
            norm_positions,
            triangles: Vec::new(),
            edges: Vec::new(),
            triangle_vertices: Vec::new(),
            centroids: Vec::new(),
            centroid_tree: (&Vec::<[f64; 2]>::new()).into(),
        }
    }

    /// Sammelt je Dreieck die 3 ungerichteten Kanten, dedupliziert sie und
    /// merkt sich bis zu 2 angrenzende Dreiecksindizes.
    fn derive_edges(triangles: &[TerrainTriangle]) -> Vec<TerrainEdge> {
        let mut edge_map: BTreeMap<(u64, u64), Vec<i32>> = BTreeMap::new();
        for (tri_index, triangle) in triangles.iter().enumerate() {
            for k in 0..3 {
                let a = triangle.point_ids[k];
                let b = triangle.point_ids[(k + 1) % 3];
                let key = if a < b { (a, b) } else { (b, a) };
                edge_map.entry(key).or_default().push(tri_index as i32);
            }
        }

        edge_map
            .into_iter()
            .map(|((a, b), incident)| {
                if incident.len() > 2 {
                    // Darf bei einer echten Delaunay-Triangulation nicht vorkommen
                    log::warn!(
                        "Kante {}-{} grenzt an {} Dreiecke, überzählige werden ignoriert",
                        a,
                        b,
                        incident.len()
                    );
                }
                TerrainEdge {
                    point_ids: [a, b],
                    triangle_indices: [
                        incident.first().copied().unwrap_or(-1),
                        incident.get(1).copied().unwrap_or(-1),
                    ],
                }
            })
            .collect()
    }

    /// Fragt die Geländehöhe an einer GK-Position ab.
    ///
    /// Innerhalb der konvexen Hülle wird baryzentrisch interpoliert; außerhalb
    /// wird der Mittelwert des Dreiecks mit dem nächstgelegenen Schwerpunkt
    /// geliefert (`extrapolated: true`). Ohne Dreiecke: `None`.
    pub fn height_at(&self, east: f64, north: f64) -> Option<HeightSample> {
        if self.triangle_vertices.is_empty() {
            return None;
        }
        let query = DVec2::new(east, north) - self.offset;

        for vertices in &self.triangle_vertices {
            let [i0, i1, i2] = *vertices;
            if let Some((u, v, w)) = barycentric(
                query,
                self.norm_positions[i0],
                self.norm_positions[i1],
                self.norm_positions[i2],
            ) {
                if u >= -BARYCENTRIC_EPS && v >= -BARYCENTRIC_EPS && w >= -BARYCENTRIC_EPS {
                    let elevation = u * self.points[i0].elevation
                        + v * self.points[i1].elevation
                        + w * self.points[i2].elevation;
                    return Some(HeightSample {
                        elevation,
                        extrapolated: false,
                    });
                }
            }
        }

        // Außerhalb der Hülle: nächstgelegener Schwerpunkt als Näherung
        let nearest = self
            .centroid_tree
            .nearest_one::<SquaredEuclidean>(&[query.x, query.y]);
        Some(HeightSample {
            elevation: self.triangle_mean_elevation(nearest.item as usize),
            extrapolated: true,
        })
    }

    /// Mittelwert der drei Eckpunkthöhen eines Dreiecks.
    fn triangle_mean_elevation(&self, triangle_index: usize) -> f64 {
        let [i0, i1, i2] = self.triangle_vertices[triangle_index];
        (self.points[i0].elevation + self.points[i1].elevation + self.points[i2].elevation) / 3.0
    }

    /// Tastet ein regelmäßiges Höhenraster im Pixelsystem ab.
    ///
    /// `project` bildet GK-Positionen auf Pixel ab und wird vor dem
    /// baryzentrischen Test auf die Dreiecksecken angewendet. Zellen außerhalb
    /// der Hülle werden nur befüllt, wenn der nächste projizierte Schwerpunkt
    /// höchstens `max_radius` Pixel entfernt liegt.
    pub fn height_grid<F>(
        &self,
        width: usize,
        height: usize,
        cell_size: f64,
        project: F,
        max_radius: f64,
    ) -> Option<HeightGrid>
    where
        F: Fn(DVec2) -> DVec2,
    {
        self.height_grid_with_progress(width, height, cell_size, project, max_radius, |_, _| true)
    }

    /// Wie [`height_grid`](Self::height_grid), ruft aber nach jeder Zeile
    /// `progress(fertige_zeilen, gesamt_zeilen)` auf; liefert der Callback
    /// `false`, wird kooperativ abgebrochen und `None` zurückgegeben.
    pub fn height_grid_with_progress<F, P>(
        &self,
        width: usize,
        height: usize,
        cell_size: f64,
        project: F,
        max_radius: f64,
        mut progress: P,
    ) -> Option<HeightGrid>
    where
        F: Fn(DVec2) -> DVec2,
        P: FnMut(usize, usize) -> bool,
    {
        if self.triangle_vertices.is_empty() || width == 0 || height == 0 || cell_size <= 0.0 {
            return None;
        }

        // Ecken und Schwerpunkte einmalig ins Pixelsystem projizieren
        let projected: Vec<DVec2> = self.points.iter().map(|p| project(p.gk())).collect();
        let projected_centroids: Vec<[f64; 2]> = self
            .triangle_vertices
            .iter()
            .map(|&[i0, i1, i2]| {
                let c = (projected[i0] + projected[i1] + projected[i2]) / 3.0;
                [c.x, c.y]
            })
            .collect();
        let centroid_tree: KdTree<f64, 2> = (&projected_centroids).into();
        let max_radius_sq = max_radius * max_radius;

        let mut cells: Vec<Option<HeightSample>> = vec![None; width * height];
        for iy in 0..height {
            for ix in 0..width {
                let query = DVec2::new(ix as f64 * cell_size, iy as f64 * cell_size);
                cells[iy * width + ix] = self.grid_sample(query, &projected, &centroid_tree, max_radius_sq);
            }
            if !progress(iy + 1, height) {
                log::debug!(
                    "Höhenraster-Berechnung nach {} von {} Zeilen abgebrochen",
                    iy + 1,
                    height
                );
                return None;
            }
        }

        Some(HeightGrid {
            width,
            height,
            cell_size,
            cells,
        })
    }

    /// Einzelne Rasterzelle: baryzentrischer Test in Pixelkoordinaten mit
    /// radiusbegrenztem Schwerpunkt-Rückfall.
    fn grid_sample(
        &self,
        query: DVec2,
        projected: &[DVec2],
        centroid_tree: &KdTree<f64, 2>,
        max_radius_sq: f64,
    ) -> Option<HeightSample> {
        for vertices in &self.triangle_vertices {
            let [i0, i1, i2] = *vertices;
            if let Some((u, v, w)) =
                barycentric(query, projected[i0], projected[i1], projected[i2])
            {
                if u >= -BARYCENTRIC_EPS && v >= -BARYCENTRIC_EPS && w >= -BARYCENTRIC_EPS {
                    let elevation = u * self.points[i0].elevation
                        + v * self.points[i1].elevation
                        + w * self.points[i2].elevation;
                    return Some(HeightSample {
                        elevation,
                        extrapolated: false,
                    });
                }
            }
        }

        let nearest = centroid_tree.nearest_one::<SquaredEuclidean>(&[query.x, query.y]);
        if nearest.distance > max_radius_sq {
            return None;
        }
        Some(HeightSample {
            elevation: self.triangle_mean_elevation(nearest.item as usize),
            extrapolated: true,
        })
    }

    /// Alle Höhenpunkte.
    pub fn points(&self) -> &[TerrainPoint] {
        &self.points
    }

    /// Alle Dreiecke.
    pub fn triangles(&self) -> &[TerrainTriangle] {
        &self.triangles
    }

    /// Alle Kanten.
    pub fn edges(&self) -> &[TerrainEdge] {
        &self.edges
    }

    /// Verschiebung, die vor der Triangulation abgezogen wurde.
    pub fn offset(&self) -> DVec2 {
        self.offset
    }

    /// Anzahl der Höhenpunkte.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Anzahl der Dreiecke.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Anzahl der Kanten.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Gibt `true` zurück, wenn das Modell keine Dreiecke enthält.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Normalisierte Schwerpunkte der Dreiecke (für Diagnose/Tests).
    pub fn centroids(&self) -> &[DVec2] {
        &self.centroids
    }
}

/// Baryzentrische Koordinaten `(u, v, w)` von `p` bezüglich `(a, b, c)`.
///
/// `None` bei entartetem Dreieck (Flächen-Nenner ≈ 0).
fn barycentric(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> Option<(f64, f64, f64)> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let denom = v0.x * v1.y - v1.x * v0.y;
    if denom.abs() < DEGENERATE_AREA_EPS {
        return None;
    }
    let v = (v2.x * v1.y - v1.x * v2.y) / denom;
    let w = (v0.x * v2.y - v2.x * v0.y) / denom;
    let u = 1.0 - v - w;
    Some((u, v, w))
}
