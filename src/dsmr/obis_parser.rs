use super::structs::DataLine;
use super::DsmrError;

/// Split one telegram body line into its OBIS code and value groups.
///
/// Example formats:
/// 1-0:1.8.1(000123.456*kWh)
/// 0-0:96.14.0(0002)
/// 0-1:24.2.1(101209112500W)(12785.123*m3)
pub fn parse_data_line(line: &str) -> Result<DataLine, DsmrError> {
    let line = line.trim();

    let paren_start = line
        .find('(')
        .ok_or_else(|| DsmrError::Framing(format!("data line without value group: '{}'", line)))?;

    let obis = line[..paren_start].trim();
    if !validate_obis_code(obis) {
        return Err(DsmrError::Framing(format!(
            "data line without a valid OBIS code: '{}'",
            line
        )));
    }

    let mut groups = Vec::new();
    let mut rest = &line[paren_start..];
    while let Some(after_open) = rest.strip_prefix('(') {
        let close = after_open.find(')').ok_or_else(|| {
            DsmrError::Framing(format!("unterminated value group: '{}'", line))
        })?;
        groups.push(after_open[..close].to_string());
        rest = &after_open[close + 1..];
    }

    if !rest.trim().is_empty() {
        return Err(DsmrError::Framing(format!(
            "trailing data after value groups: '{}'",
            line
        )));
    }

    Ok(DataLine {
        obis: obis.to_string(),
        groups,
    })
}

/// Check the `A-B:C.D.E` shape of an OBIS code (trailing groups may be
/// omitted by some meters, but at least `C.D` must be present).
pub fn validate_obis_code(code: &str) -> bool {
    let Some((medium, quantity)) = code.split_once(':') else {
        return false;
    };

    let Some((a, b)) = medium.split_once('-') else {
        return false;
    };
    if a.parse::<u32>().is_err() || b.parse::<u32>().is_err() {
        return false;
    }

    let parts: Vec<&str> = quantity.split('.').collect();
    if parts.len() < 2 {
        return false;
    }
    parts.iter().all(|p| p.parse::<u32>().is_ok())
}
