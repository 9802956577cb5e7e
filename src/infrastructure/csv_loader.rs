// CSV channel files: a time column plus one column per channel
use crate::domain::channel::{Channel, ChannelSet, Sample};
use crate::error::{ReportError, Result};
use std::path::Path;

const TIME_COLUMNS: [&str; 6] = ["time", "time[s]", "time(s)", "timestamp", "t", "时间"];

/// Unit from a trailing `(unit)` or `[unit]` suffix
fn unit_of(header: &str) -> Option<String> {
    let header = header.trim();
    let (open, close) = match header.chars().last()? {
        ')' => ('(', ')'),
        ']' => ('[', ']'),
        _ => return None,
    };
    let start = header.rfind(open)?;
    let unit = header[start + 1..header.len() - close.len_utf8()].trim();
    (!unit.is_empty()).then(|| unit.to_string())
}

fn is_time_column(header: &str) -> bool {
    let lower = header.trim().to_lowercase();
    TIME_COLUMNS.contains(&lower.as_str())
}

fn invalid(source: &str, err: csv::Error) -> ReportError {
    ReportError::InvalidData(format!("{}: {}", source, err))
}

/// Parse CSV text into a channel set. `source` only labels error messages.
pub fn parse_csv(source: &str, text: &str) -> Result<ChannelSet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| invalid(source, e))?
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = name.trim_start_matches('\u{feff}').trim();
            if name.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                name.to_string()
            }
        })
        .collect();
    if headers.is_empty() {
        return Err(ReportError::InvalidData(format!("{}: file is empty", source)));
    }
    let time_col = headers.iter().position(|h| is_time_column(h)).unwrap_or(0);

    let mut columns: Vec<Vec<Sample>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(|e| invalid(source, e))?;
        let line_no = record.position().map_or(0, |pos| pos.line());
        let time_field = record.get(time_col).map(str::trim).unwrap_or("");
        if time_field.is_empty() {
            tracing::warn!("{}: line {} has no timestamp, skipped", source, line_no);
            continue;
        }
        let time: f64 = time_field.parse().map_err(|_| {
            ReportError::InvalidData(format!(
                "{}: line {} has an invalid timestamp '{}'",
                source, line_no, time_field
            ))
        })?;

        for (col, field) in record.iter().enumerate().take(headers.len()) {
            let field = field.trim();
            if col == time_col || field.is_empty() {
                continue;
            }
            let value: f64 = field.parse().map_err(|_| {
                ReportError::InvalidData(format!(
                    "{}: line {} column '{}' is not a number: '{}'",
                    source, line_no, headers[col], field
                ))
            })?;
            // NaN / inf cells are gaps
            if value.is_finite() {
                columns[col].push(Sample::new(time, value));
            }
        }
    }

    let channels = headers
        .iter()
        .zip(columns)
        .enumerate()
        .filter(|(idx, _)| *idx != time_col)
        .map(|(_, (name, samples))| Channel::new(name.clone(), unit_of(name), samples))
        .collect::<Result<Vec<_>>>()?;
    ChannelSet::new(channels)
}

pub async fn load_csv_file(path: &Path) -> Result<ChannelSet> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_csv(&path.display().to_string(), &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::ChannelSource;

    #[test]
    fn test_parse_with_units_quotes_and_gaps() {
        let text = "\u{feff}Time,Ng(rpm),\"Temperature(°C)\",Note\n\
                    0,14000,20,\n\
                    1,15200,,\n\
                    2,\"15300\",450,\"1,5\"\n";
        let err = parse_csv("run.csv", text).unwrap_err();
        // "1,5" is a single quoted field and not a number
        assert!(err.to_string().contains("column 'Note'"));

        let text = "Time,Ng(rpm),\"Temperature(°C)\"\n0,14000,20\n1,15200,\n2,\"15300\",450\n";
        let set = parse_csv("run.csv", text).unwrap();
        assert_eq!(set.len(), 2);
        let ng = set.channel("Ng(rpm)").unwrap();
        assert_eq!(ng.unit(), Some("rpm"));
        assert_eq!(ng.samples().len(), 3);
        let temperature = set.channel("Temperature(°C)").unwrap();
        assert_eq!(temperature.unit(), Some("°C"));
        assert_eq!(
            temperature.samples(),
            &[Sample::new(0.0, 20.0), Sample::new(2.0, 450.0)]
        );
    }

    #[test]
    fn test_time_column_detected_by_name() {
        let text = "Ng,timestamp,Np\n100,0.5,7\n200,1.5,8\n";
        let set = parse_csv("run.csv", text).unwrap();
        assert_eq!(set.channel_names(), vec!["Ng", "Np"]);
        assert_eq!(set.channel("Ng").unwrap().first().unwrap().time, 0.5);
        assert_eq!(set.channel("Np").unwrap().unit(), None);
    }

    #[test]
    fn test_first_column_is_time_by_default() {
        let set = parse_csv("run.csv", "secs,P[kPa]\n0,1\n1,2\n").unwrap();
        assert_eq!(set.channel("P[kPa]").unwrap().unit(), Some("kPa"));
        assert!(set.channel("secs").is_none());
    }

    #[test]
    fn test_rejects_bad_rows() {
        let err = parse_csv("run.csv", "Time,Ng\n0,1\nabc,2\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));

        let err = parse_csv("run.csv", "Time,Ng\n1,1\n0,2\n").unwrap_err();
        assert!(matches!(err, ReportError::InvalidData(_)));

        assert!(parse_csv("empty.csv", "\n\n").is_err());
    }

    #[test]
    fn test_quoted_fields_may_span_lines() {
        let set = parse_csv("run.csv", "time,\"Ng\n(rpm)\",Np\n0,1,2\n1,3,4\n").unwrap();
        assert_eq!(set.channel_names(), vec!["Ng\n(rpm)", "Np"]);
        assert_eq!(set.channel("Ng\n(rpm)").unwrap().unit(), Some("rpm"));
        assert_eq!(set.channel("Np").unwrap().last().unwrap().value, 4.0);

        let set = parse_csv("run.csv", "Time,Ng,\"Note\"\n0,1,\"\"\n\n1,2,\n").unwrap();
        assert_eq!(set.channel("Ng").unwrap().samples().len(), 2);
    }
}
