//! Deterministische Codierung der Verbindungs-IDs.
//!
//! Format `M{mast}-E{ebene}-{L|R}{nummer}`, z.B. `M3-E2-L1`. Die Codierung
//! ist eine reine, umkehrbare Funktion: das Zurückparsen liefert das 4-Tupel
//! ohne jede externe Nachschlagetabelle. Darüber werden mastübergreifende
//! Verknüpfungen ohne relationalen Index ausgedrückt.

use anyhow::{bail, Context, Result};

use super::Side;

/// Decodiertes 4-Tupel einer Verbindungs-ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRef {
    pub pole_id: u64,
    pub level_number: u32,
    pub side: Side,
    /// 1-basierte Nummer innerhalb der Seite
    pub connection_number: u32,
}

/// Codiert das 4-Tupel in die deterministische ID.
pub fn encode_connection_id(
    pole_id: u64,
    level_number: u32,
    side: Side,
    connection_number: u32,
) -> String {
    format!(
        "M{}-E{}-{}{}",
        pole_id,
        level_number,
        side.letter(),
        connection_number
    )
}

/// Parst eine Verbindungs-ID zurück in ihr 4-Tupel.
pub fn decode_connection_id(id: &str) -> Result<ConnectionRef> {
    let mut parts = id.splitn(3, '-');
    let mast_part = parts.next().unwrap_or_default();
    let level_part = parts.next().unwrap_or_default();
    let conn_part = parts.next().unwrap_or_default();

    let pole_id: u64 = mast_part
        .strip_prefix('M')
        .with_context(|| format!("Verbindungs-ID '{id}': Mast-Teil muss mit 'M' beginnen"))?
        .parse()
        .with_context(|| format!("Verbindungs-ID '{id}': ungültige Mastnummer"))?;

    let level_number: u32 = level_part
        .strip_prefix('E')
        .with_context(|| format!("Verbindungs-ID '{id}': Ebenen-Teil muss mit 'E' beginnen"))?
        .parse()
        .with_context(|| format!("Verbindungs-ID '{id}': ungültige Ebenennummer"))?;

    let side = match conn_part.chars().next() {
        Some('L') => Side::Left,
        Some('R') => Side::Right,
        _ => bail!("Verbindungs-ID '{id}': Seite muss 'L' oder 'R' sein"),
    };
    let connection_number: u32 = conn_part[1..]
        .parse()
        .with_context(|| format!("Verbindungs-ID '{id}': ungültige Verbindungsnummer"))?;
    if connection_number == 0 {
        bail!("Verbindungs-ID '{id}': Verbindungsnummer ist 1-basiert");
    }

    Ok(ConnectionRef {
        pole_id,
        level_number,
        side,
        connection_number,
    })
}

/// Leitet die ID einer Verbindungslinie aus ihren Endpunkt-IDs ab.
pub fn connection_line_id(from_connection_id: &str, to_connection_id: &str) -> String {
    format!("{from_connection_id}>{to_connection_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codierung_ist_umkehrbar() {
        for (pole, level, side, number) in [
            (1u64, 1u32, Side::Left, 1u32),
            (42, 3, Side::Right, 2),
            (7, 0, Side::Left, 15),
        ] {
            let id = encode_connection_id(pole, level, side, number);
            let decoded = decode_connection_id(&id).expect("codierte ID muss parsen");
            assert_eq!(decoded.pole_id, pole);
            assert_eq!(decoded.level_number, level);
            assert_eq!(decoded.side, side);
            assert_eq!(decoded.connection_number, number);
        }
    }

    #[test]
    fn beispiel_id_ist_lesbar() {
        assert_eq!(encode_connection_id(3, 2, Side::Left, 1), "M3-E2-L1");
        assert_eq!(encode_connection_id(12, 1, Side::Right, 4), "M12-E1-R4");
    }

    #[test]
    fn kaputte_ids_sind_fehler() {
        for id in [
            "",
            "M3",
            "M3-E2",
            "X3-E2-L1",
            "M3-F2-L1",
            "M3-E2-X1",
            "M3-E2-L0",
            "M3-E2-L",
            "Mdrei-E2-L1",
            "M3-E2-Lacht",
        ] {
            assert!(decode_connection_id(id).is_err(), "'{id}' darf nicht parsen");
        }
    }

    #[test]
    fn linien_id_verbindet_beide_enden() {
        let from = encode_connection_id(1, 1, Side::Left, 1);
        let to = encode_connection_id(2, 1, Side::Left, 1);
        assert_eq!(connection_line_id(&from, &to), "M1-E1-L1>M2-E1-L1");
    }
}
