//! Tests des Trassen-Containers: Mastfolge, Kaskaden, Verknüpfungs-Prüfung.

use approx::assert_relative_eq;
use glam::{DVec2, DVec3};

use super::conn_id::encode_connection_id;
use super::{Connection, ConnectionLine, Level, Pole, Side, Trasse};

/// Mast mit einer Ebene und je einer Verbindung links/rechts.
fn mast(id: u64, east: f64, north: f64) -> Pole {
    let mut pole = Pole::new(
        id,
        1,
        DVec3::new(east, north, 100.0),
        DVec2::new(east / 10.0, north / 10.0),
        45.0,
        102.0,
    );
    let mut level = Level::new(1, 30.0);
    level.add_connection(Connection::new(id, 1, Side::Left, 1, 6.0, "Haengekette"));
    level.add_connection(Connection::new(id, 1, Side::Right, 1, 6.0, "Haengekette"));
    pole.levels.push(level);
    pole
}

/// Trasse aus drei Masten auf einer Winkellinie, Verbindungen verkettet.
fn beispiel_trasse() -> Trasse {
    let mut trasse = Trasse::new(1, "Testtrasse");
    trasse.add_pole(mast(1, 0.0, 0.0));
    trasse.add_pole(mast(2, 100.0, 0.0));
    trasse.add_pole(mast(3, 100.0, 100.0));

    for (from, to) in [(1u64, 2u64), (2, 3)] {
        for side in [Side::Left, Side::Right] {
            let from_id = encode_connection_id(from, 1, side, 1);
            let to_id = encode_connection_id(to, 1, side, 1);
            let pole = trasse.pole_mut(from).unwrap();
            let level = pole.level_mut(1).unwrap();
            let list = match side {
                Side::Left => &mut level.left_connections,
                Side::Right => &mut level.right_connections,
            };
            list[0].linked_connection_id = Some(to_id.clone());
            trasse.add_connection_line(ConnectionLine::new(1, from_id, to_id, "Al/St 240/40", 8.0));
        }
    }
    trasse
}

#[test]
fn add_pole_berechnet_ausrichtungen_neu() {
    let trasse = beispiel_trasse();
    // Erster Mast: Senkrechte auf (1, 0) → (0, 1), in beiden Systemen
    let first = trasse.pole(1).unwrap();
    assert_relative_eq!(first.orientation_gk.y, 1.0, epsilon = 1e-12);
    assert_relative_eq!(first.orientation_local.y, 1.0, epsilon = 1e-12);
    // Mittelmast: Winkelhalbierende
    let wert = 0.5_f64.sqrt();
    let middle = trasse.pole(2).unwrap();
    assert_relative_eq!(middle.orientation_gk.x, -wert, epsilon = 1e-9);
    assert_relative_eq!(middle.orientation_gk.y, -wert, epsilon = 1e-9);
}

#[test]
fn update_pole_position_berechnet_ausrichtungen_neu() {
    let mut trasse = beispiel_trasse();
    // Knick auflösen: Mast 3 auf die Gerade schieben
    assert!(trasse.update_pole_position(3, DVec3::new(200.0, 0.0, 100.0), DVec2::new(20.0, 0.0)));
    let middle = trasse.pole(2).unwrap();
    assert_relative_eq!(middle.orientation_gk.x, 0.0, epsilon = 1e-9);
    assert_relative_eq!(middle.orientation_gk.y, 1.0, epsilon = 1e-9);

    assert!(!trasse.update_pole_position(99, DVec3::ZERO, DVec2::ZERO));
}

#[test]
fn remove_pole_kaskadiert() {
    let mut trasse = beispiel_trasse();
    assert_eq!(trasse.connection_lines.len(), 4);

    let removed = trasse.remove_pole(2).expect("Mast 2 existiert");
    assert_eq!(removed.id, 2);
    assert_eq!(trasse.pole_count(), 2);
    // Alle Linien berührten Mast 2
    assert!(trasse.connection_lines.is_empty());
    // Verweise von Mast 1 auf Mast 2 sind gelöst
    for connection in trasse.pole(1).unwrap().connections_iter() {
        assert!(connection.linked_connection_id.is_none());
    }

    assert!(trasse.remove_pole(2).is_none());
}

#[test]
fn connection_lookup_ueber_id() {
    let trasse = beispiel_trasse();
    let id = encode_connection_id(2, 1, Side::Right, 1);
    let connection = trasse.connection(&id).expect("Verbindung muss auflösbar sein");
    assert_eq!(connection.pole_id, 2);
    assert_eq!(connection.side, Side::Right);

    assert!(trasse.connection("M9-E1-L1").is_none());
    assert!(trasse.connection("kaputt").is_none());
}

#[test]
fn line_for_connection_findet_startpunkt() {
    let trasse = beispiel_trasse();
    let from = encode_connection_id(1, 1, Side::Left, 1);
    let line = trasse.line_for_connection(&from).expect("Linie erwartet");
    assert_eq!(line.to_connection_id, encode_connection_id(2, 1, Side::Left, 1));
    assert_eq!(line.conductor_type_name, "Al/St 240/40");

    assert!(trasse
        .line_for_connection(&encode_connection_id(3, 1, Side::Left, 1))
        .is_none());
}

#[test]
fn insert_pole_haelt_reihenfolge() {
    let mut trasse = beispiel_trasse();
    trasse.insert_pole(1, mast(4, 50.0, 0.0));
    let ids: Vec<u64> = trasse.poles.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 4, 2, 3]);
    assert_eq!(trasse.next_pole_id(), 5);
}

#[test]
fn validate_links_ohne_befund() {
    let trasse = beispiel_trasse();
    let validation = trasse.validate_links();
    assert!(validation.is_ok(), "Beispieltrasse muss sauber sein: {validation:?}");
}

#[test]
fn validate_links_meldet_befunde() {
    let mut trasse = beispiel_trasse();
    {
        let level = trasse.pole_mut(1).unwrap().level_mut(1).unwrap();
        // Unparsbare ID
        level.left_connections[0].linked_connection_id = Some("unsinn".into());
        // Ziel existiert nicht am Folgemast (Ebene 9)
        level.right_connections[0].linked_connection_id =
            Some(encode_connection_id(2, 9, Side::Right, 1));
    }
    {
        // Verweis überspringt einen Mast (1 → 3): nicht benachbart
        let level = trasse.pole_mut(2).unwrap().level_mut(1).unwrap();
        level.left_connections[0].linked_connection_id =
            Some(encode_connection_id(1, 1, Side::Left, 1));
    }

    let validation = trasse.validate_links();
    assert_eq!(validation.unparsable, vec!["unsinn".to_string()]);
    assert_eq!(validation.dangling.len(), 1);
    assert_eq!(validation.non_adjacent.len(), 1);
    assert!(!validation.is_ok());
}

#[test]
fn remove_connection_line_entfernt_nach_id() {
    let mut trasse = beispiel_trasse();
    let line_id = trasse.connection_lines.keys().next().unwrap().clone();
    assert!(trasse.remove_connection_line(&line_id).is_some());
    assert!(trasse.remove_connection_line(&line_id).is_none());
    assert_eq!(trasse.connection_lines.len(), 3);
}

#[test]
fn connection_count_summiert_alle_masten() {
    let trasse = beispiel_trasse();
    assert_eq!(trasse.connection_count(), 6);
    assert_eq!(trasse.pole(1).unwrap().connection_count(), 2);
}
