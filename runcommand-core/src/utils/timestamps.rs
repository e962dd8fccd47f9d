use chrono::Utc;

/// Timestamp in the format guest agents expect in status files (YYYY-MM-DDTHH:MM:SSZ)
pub fn get_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn timestamp_parses_back() {
        let ts = get_timestamp();
        assert!(NaiveDateTime::parse_from_str(&ts, "%Y-%m-%dT%H:%M:%SZ").is_ok(), "{ts}");
    }
}
