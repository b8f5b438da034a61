//! Umwandlung zwischen dem editierbaren Trassengraphen und dem
//! physikalischen Mastbaum, in beide Richtungen.
//!
//! Vorwärts werden Durchgangspunkte aus Mastposition, Querausrichtung,
//! Ebenenhöhe und Isolatorlänge aufgelöst und Verweise als
//! vorzeichenbehaftete Indizes codiert. Rückwärts entsteht der Graph 1:1 mit
//! neu abgeleiteten deterministischen IDs. Unparsbare oder ins Leere zeigende
//! Verweise degradieren still zu "keine Verknüpfung", werden aber gezählt und
//! geloggt — ein harter Fehler ist nur ein unbekannter Isolatortyp, weil der
//! sonst unbemerkt die berechneten Höhen verfälschen würde.

use anyhow::{Context, Result};
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::config::{ConductorTypeRegistry, InsulatorTable};
use crate::orientation::DEFAULT_ORIENTATION;
use crate::physical::{PhysicalConductor, PhysicalLevel, PhysicalMast, PhysicalTree};
use crate::trasse::conn_id::{decode_connection_id, encode_connection_id};
use crate::trasse::{AcDcKind, Connection, ConnectionLine, Level, Pole, Side, Trasse};

/// Explizite Konfiguration der Umwandlung.
#[derive(Debug, Clone, Default)]
pub struct ConversionConfig {
    /// Isolatorlängen je Bauform; unbekannte Typen sind ein harter Fehler
    pub insulator_table: InsulatorTable,
    /// Rückfallebene für Schallleistungspegel nach Leitertyp-Name
    pub conductor_types: ConductorTypeRegistry,
}

/// Zähler der Vorwärts-Umwandlung, insbesondere der tolerierten Degradierungen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Anzahl erzeugter Masten
    pub masts: usize,
    /// Anzahl erzeugter Leiter
    pub conductors: usize,
    /// Erfolgreich aufgelöste Verknüpfungen
    pub links_resolved: usize,
    /// Verweise mit unparsbarer ID (degradiert zu "keine Verknüpfung")
    pub unparsable_link_ids: usize,
    /// Verweise, deren Ziel am Folgemast fehlt oder nicht benachbart ist
    pub dangling_links: usize,
    /// Am letzten Mast erzwungene offene Enden
    pub forced_open_ends: usize,
}

/// Vorwärts: editierbarer Graph → physikalischer Baum.
///
/// Läuft über die Masten in Trassenreihenfolge; die Ausrichtungen müssen
/// aktuell sein (siehe [`Trasse::refresh_orientations`]).
pub fn graph_to_physical(
    trasse: &Trasse,
    config: &ConversionConfig,
) -> Result<(PhysicalTree, ConversionReport)> {
    let mut report = ConversionReport::default();
    let mut masts = Vec::with_capacity(trasse.poles.len());

    for (index, pole) in trasse.poles.iter().enumerate() {
        let next_pole = trasse.poles.get(index + 1);
        let orientation = pole
            .orientation_gk
            .try_normalize()
            .unwrap_or(DEFAULT_ORIENTATION);

        let mut levels = Vec::with_capacity(pole.levels.len());
        for level in &pole.levels {
            let mut physical_level = PhysicalLevel::new(level.level_number, level.level_height);
            for side in [Side::Left, Side::Right] {
                for connection in level.connections(side) {
                    let insulator_length = config
                        .insulator_table
                        .length_of(&connection.insulator_type)
                        .with_context(|| {
                            format!(
                                "Mast {}, Ebene {}, Verbindung {}",
                                pole.id, level.level_number, connection.id
                            )
                        })?;

                    let planar = pole.position_gk.truncate()
                        + orientation * side.sign() * connection.horizontal_offset;
                    let z = pole.nullpoint_height + level.level_height - insulator_length;
                    let mut conductor = PhysicalConductor::new(
                        connection.connection_number,
                        connection.horizontal_offset,
                        connection.insulator_type.clone(),
                        DVec3::new(planar.x, planar.y, z),
                    );

                    let (link_level, link_index) = resolve_link(connection, next_pole, &mut report);
                    conductor.link_level = link_level;
                    conductor.link_index = link_index;

                    let fields =
                        conductor_fields(connection, trasse.line_for_connection(&connection.id), &config.conductor_types);
                    conductor.conductor_type = fields.conductor_type;
                    conductor.sag = fields.sag;
                    conductor.voltage = fields.voltage;
                    conductor.sound_power = fields.sound_power;
                    conductor.acdc = fields.acdc;

                    report.conductors += 1;
                    match side {
                        Side::Left => physical_level.left.push(conductor),
                        Side::Right => physical_level.right.push(conductor),
                    }
                }
            }
            levels.push(physical_level);
        }

        masts.push(PhysicalMast {
            pole_id: pole.id,
            position_gk: pole.position_gk,
            position_local: pole.position_local,
            pole_height: pole.pole_height,
            nullpoint_height: pole.nullpoint_height,
            orientation_local: pole.orientation_local,
            orientation_gk: pole.orientation_gk,
            levels,
        });
        report.masts += 1;
    }

    log::info!(
        "Graph → physikalisches Modell: {} Masten, {} Leiter, {} Verknüpfungen aufgelöst \
         ({} unparsbar, {} ohne Ziel, {} erzwungene offene Enden)",
        report.masts,
        report.conductors,
        report.links_resolved,
        report.unparsable_link_ids,
        report.dangling_links,
        report.forced_open_ends
    );

    Ok((PhysicalTree { trasse_id: trasse.id, masts }, report))
}

/// Löst den Verweis einer Verbindung in `(ebene, vorzeichen·nummer)` auf.
///
/// Degradierungen (unparsbar, fehlendes Ziel, letzter Mast) liefern `(0, 0)`
/// und erhöhen den jeweiligen Zähler.
fn resolve_link(
    connection: &Connection,
    next_pole: Option<&Pole>,
    report: &mut ConversionReport,
) -> (u32, i32) {
    let Some(link_id) = connection.linked_connection_id.as_deref() else {
        return (0, 0);
    };

    let target = match decode_connection_id(link_id) {
        Ok(target) => target,
        Err(err) => {
            log::warn!(
                "Verbindung {}: Verweis '{}' nicht parsbar ({err:#}), degradiere zu offenem Ende",
                connection.id,
                link_id
            );
            report.unparsable_link_ids += 1;
            return (0, 0);
        }
    };

    // Am letzten Mast gibt es keinen Folgemast: Verweis wird unabhängig vom
    // gespeicherten Wert zum offenen Ende.
    let Some(next) = next_pole else {
        report.forced_open_ends += 1;
        return (0, 0);
    };

    if target.pole_id != next.id {
        log::warn!(
            "Verbindung {}: Verweis '{}' zeigt nicht auf den Folgemast {}, degradiere zu offenem Ende",
            connection.id,
            link_id,
            next.id
        );
        report.dangling_links += 1;
        return (0, 0);
    }

    if next
        .connection(target.level_number, target.side, target.connection_number)
        .is_none()
    {
        log::warn!(
            "Verbindung {}: Ziel '{}' existiert am Mast {} nicht, degradiere zu offenem Ende",
            connection.id,
            link_id,
            next.id
        );
        report.dangling_links += 1;
        return (0, 0);
    }

    report.links_resolved += 1;
    let sign = match target.side {
        Side::Left => -1,
        Side::Right => 1,
    };
    (target.level_number, sign * target.connection_number as i32)
}

/// Aufgelöste Leiterfelder eines Leiters.
struct ConductorFields {
    conductor_type: Option<String>,
    sag: f64,
    voltage: Option<f64>,
    sound_power: Option<f64>,
    acdc: Option<AcDcKind>,
}

/// Leitertyp, Durchhang und elektrische Felder aus der Verbindungslinie
/// übernehmen; ohne Linie gelten die Felder der Verbindung selbst.
/// Fehlender Schallleistungspegel fällt auf das Leitertyp-Register zurück.
fn conductor_fields(
    connection: &Connection,
    line: Option<&ConnectionLine>,
    registry: &ConductorTypeRegistry,
) -> ConductorFields {
    let (conductor_type, sag, voltage, sound_power, acdc) = match line {
        Some(line) => (
            Some(line.conductor_type_name.clone()).filter(|name| !name.is_empty()),
            line.sag,
            line.voltage,
            line.sound_power,
            line.acdc,
        ),
        None => (
            connection.conductor_type.clone(),
            connection.sag,
            connection.voltage,
            connection.sound_power,
            connection.acdc,
        ),
    };

    let sound_power = sound_power.or_else(|| {
        conductor_type
            .as_deref()
            .and_then(|name| registry.sound_power_of(name))
    });

    ConductorFields {
        conductor_type,
        sag,
        voltage,
        sound_power,
        acdc,
    }
}

/// Rückwärts: physikalischer Baum → editierbarer Graph.
///
/// Ebenen und Verbindungen entstehen 1:1 mit neu abgeleiteten IDs; der
/// aufgelöste Durchgangspunkt und die elektrischen Felder bleiben als
/// nicht-autoritative Zusatzdaten an der Verbindung erhalten. Je Leiter mit
/// Verknüpfung wird eine Verbindungslinie synthetisiert.
pub fn physical_to_graph(tree: &PhysicalTree, name: impl Into<String>) -> Trasse {
    let mut trasse = Trasse::new(tree.trasse_id, name);

    for (index, mast) in tree.masts.iter().enumerate() {
        let next_mast = tree.masts.get(index + 1);
        let mut pole = Pole::new(
            mast.pole_id,
            tree.trasse_id,
            mast.position_gk,
            mast.position_local,
            mast.pole_height,
            mast.nullpoint_height,
        );

        for physical_level in &mast.levels {
            let mut level = Level::new(physical_level.level_number, physical_level.level_height);
            for (side, conductors) in [
                (Side::Left, &physical_level.left),
                (Side::Right, &physical_level.right),
            ] {
                for conductor in conductors {
                    let mut connection = Connection::new(
                        mast.pole_id,
                        physical_level.level_number,
                        side,
                        conductor.connection_number,
                        conductor.horizontal_offset,
                        conductor.insulator_type.clone(),
                    );
                    connection.resolved_passage = Some(conductor.passage);
                    connection.conductor_type = conductor.conductor_type.clone();
                    connection.sag = conductor.sag;
                    connection.voltage = conductor.voltage;
                    connection.sound_power = conductor.sound_power;
                    connection.acdc = conductor.acdc;

                    if let (Some(target_side), Some(next)) = (conductor.link_side(), next_mast) {
                        let target_id = encode_connection_id(
                            next.pole_id,
                            conductor.link_level,
                            target_side,
                            conductor.link_index.unsigned_abs(),
                        );
                        let mut line = ConnectionLine::new(
                            tree.trasse_id,
                            connection.id.clone(),
                            target_id.clone(),
                            conductor.conductor_type.clone().unwrap_or_default(),
                            conductor.sag,
                        );
                        line.voltage = conductor.voltage;
                        line.sound_power = conductor.sound_power;
                        line.acdc = conductor.acdc;
                        trasse.add_connection_line(line);
                        connection.linked_connection_id = Some(target_id);
                    }

                    level.add_connection(connection);
                }
            }
            pole.levels.push(level);
        }
        trasse.poles.push(pole);
    }

    // Ausrichtung ist aus den Positionen ableitbar und damit reproduzierbar
    trasse.refresh_orientations();
    log::debug!(
        "Physikalisches Modell → Graph: {} Masten, {} Verbindungen, {} Linien",
        trasse.pole_count(),
        trasse.connection_count(),
        trasse.connection_lines.len()
    );
    trasse
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{DVec2, DVec3};

    fn konfiguration() -> ConversionConfig {
        let mut conductor_types = ConductorTypeRegistry::new();
        conductor_types.insert("Al/St 240/40", 82.5);
        ConversionConfig {
            insulator_table: InsulatorTable::standard(),
            conductor_types,
        }
    }

    /// Zwei Masten auf der x-Achse, links/rechts je eine verkettete Verbindung.
    fn einfache_trasse() -> Trasse {
        let mut trasse = Trasse::new(7, "Feldtest");
        for (id, east) in [(1u64, 0.0), (2, 200.0)] {
            let mut pole = Pole::new(
                id,
                7,
                DVec3::new(east, 0.0, 100.0),
                DVec2::new(east / 10.0, 0.0),
                40.0,
                100.0,
            );
            let mut level = Level::new(1, 30.0);
            let mut links = Connection::new(id, 1, Side::Left, 1, 6.0, "Haengekette");
            let mut rechts = Connection::new(id, 1, Side::Right, 1, 6.0, "Haengekette");
            if id == 1 {
                links.linked_connection_id =
                    Some(encode_connection_id(2, 1, Side::Left, 1));
                rechts.linked_connection_id =
                    Some(encode_connection_id(2, 1, Side::Right, 1));
            }
            level.add_connection(links);
            level.add_connection(rechts);
            pole.levels.push(level);
            trasse.add_pole(pole);
        }
        trasse.add_connection_line(ConnectionLine::new(
            7,
            encode_connection_id(1, 1, Side::Left, 1),
            encode_connection_id(2, 1, Side::Left, 1),
            "Al/St 240/40",
            8.0,
        ));
        trasse
    }

    #[test]
    fn durchgangspunkte_werden_aufgeloest() {
        let trasse = einfache_trasse();
        let (tree, report) = graph_to_physical(&trasse, &konfiguration()).unwrap();

        assert_eq!(report.masts, 2);
        assert_eq!(report.conductors, 4);
        assert_eq!(report.links_resolved, 2);
        assert_eq!(report.dangling_links, 0);

        // Ausrichtung beider Masten: (0, 1); links = +1 → Versatz nach Norden
        let links = tree.masts[0].conductor(1, -1).unwrap();
        assert_relative_eq!(links.passage.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(links.passage.y, 6.0, epsilon = 1e-9);
        // z = nullpunkt 100 + ebene 30 − Hängekette 4
        assert_relative_eq!(links.passage.z, 126.0, epsilon = 1e-9);

        let rechts = tree.masts[0].conductor(1, 1).unwrap();
        assert_relative_eq!(rechts.passage.y, -6.0, epsilon = 1e-9);
    }

    #[test]
    fn leitertyp_kommt_aus_der_linie_mit_register_rueckfall() {
        let trasse = einfache_trasse();
        let (tree, _) = graph_to_physical(&trasse, &konfiguration()).unwrap();

        // Linke Verbindung hat eine Linie: Typ und Register-Pegel
        let links = tree.masts[0].conductor(1, -1).unwrap();
        assert_eq!(links.conductor_type.as_deref(), Some("Al/St 240/40"));
        assert_relative_eq!(links.sag, 8.0, epsilon = 1e-12);
        assert_eq!(links.sound_power, Some(82.5));

        // Rechte Verbindung hat keine Linie und keine eigenen Felder
        let rechts = tree.masts[0].conductor(1, 1).unwrap();
        assert_eq!(rechts.conductor_type, None);
        assert_eq!(rechts.sound_power, None);
    }

    #[test]
    fn unbekannter_isolatortyp_ist_harter_fehler() {
        let mut trasse = einfache_trasse();
        trasse.pole_mut(1).unwrap().levels[0].left_connections[0].insulator_type =
            "Porzellan-Spezial".into();
        let err = graph_to_physical(&trasse, &konfiguration()).unwrap_err();
        assert!(format!("{err:#}").contains("Porzellan-Spezial"));
    }

    #[test]
    fn kaputte_verweise_degradieren_mit_diagnose() {
        let mut trasse = einfache_trasse();
        {
            let level = &mut trasse.pole_mut(1).unwrap().levels[0];
            level.left_connections[0].linked_connection_id = Some("unsinn".into());
            level.right_connections[0].linked_connection_id =
                Some(encode_connection_id(2, 5, Side::Right, 1));
        }
        // Letzter Mast erhält einen Verweis: wird erzwungen offen
        trasse.pole_mut(2).unwrap().levels[0].left_connections[0].linked_connection_id =
            Some(encode_connection_id(1, 1, Side::Left, 1));

        let (tree, report) = graph_to_physical(&trasse, &konfiguration()).unwrap();
        assert_eq!(report.unparsable_link_ids, 1);
        assert_eq!(report.dangling_links, 1);
        assert_eq!(report.forced_open_ends, 1);
        assert_eq!(report.links_resolved, 0);
        for mast in &tree.masts {
            for conductor in mast.conductors_iter() {
                assert_eq!(conductor.link_index, 0);
            }
        }
    }

    #[test]
    fn rueckumwandlung_erhaelt_topologie_und_felder() {
        let trasse = einfache_trasse();
        let (tree, _) = graph_to_physical(&trasse, &konfiguration()).unwrap();
        let zurueck = physical_to_graph(&tree, "Feldtest");

        assert_eq!(zurueck.pole_count(), 2);
        assert_eq!(zurueck.connection_count(), 4);
        // Je aufgelöster Verknüpfung eine synthetisierte Linie
        assert_eq!(zurueck.connection_lines.len(), 2);

        let links = zurueck
            .connection(&encode_connection_id(1, 1, Side::Left, 1))
            .unwrap();
        assert_eq!(
            links.linked_connection_id.as_deref(),
            Some("M2-E1-L1")
        );
        assert!(links.resolved_passage.is_some());
        assert_eq!(links.conductor_type.as_deref(), Some("Al/St 240/40"));
    }

    #[test]
    fn hin_und_rueckumwandlung_ist_stabil() {
        let trasse = einfache_trasse();
        let config = konfiguration();
        let (tree, _) = graph_to_physical(&trasse, &config).unwrap();
        let (tree2, report2) =
            graph_to_physical(&physical_to_graph(&tree, "Feldtest"), &config).unwrap();

        assert_eq!(report2.dangling_links, 0);
        assert_eq!(tree.masts.len(), tree2.masts.len());
        for (mast_a, mast_b) in tree.masts.iter().zip(&tree2.masts) {
            for (a, b) in mast_a.conductors_iter().zip(mast_b.conductors_iter()) {
                assert_relative_eq!(a.passage.x, b.passage.x, epsilon = 1e-9);
                assert_relative_eq!(a.passage.y, b.passage.y, epsilon = 1e-9);
                assert_relative_eq!(a.passage.z, b.passage.z, epsilon = 1e-9);
                assert_eq!(a.link_level, b.link_level);
                assert_eq!(a.link_index, b.link_index);
            }
        }
    }
}
