use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

/// Short name of an endpoint, used in logs and errors: the last path segment
/// without query string or `.json` suffix.
pub fn endpoint_name(uri: &str) -> &str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let last = path.rsplit('/').next().unwrap_or(path);
    last.strip_suffix(".json").unwrap_or(last)
}

/// Milliseconds since the Unix epoch, as the `siteData` endpoints expect.
pub fn epoch_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// `dd/mm/YYYY`, percent-encoded for the chart endpoints.
pub fn chart_date(day: NaiveDate) -> String {
    urlencoding::encode(&day.format("%d/%m/%Y").to_string()).into_owned()
}

/// "HH:MM" one minute after `now`. Clamped to "23:59" so the result never wraps
/// past midnight.
pub fn minute_after(now: NaiveTime) -> String {
    let (next, wrapped) = now.overflowing_add_signed(Duration::minutes(1));
    if wrapped != 0 || (next.hour() == 0 && next.minute() == 0) {
        return "23:59".to_string();
    }
    next.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn endpoint_names() {
        assert_eq!(endpoint_name("https://myvoltalis.com/scheduler/getModeList.json"), "getModeList");
        assert_eq!(
            endpoint_name("https://myvoltalis.com/absence/getAbsenceState.json?csLinkId=42"),
            "getAbsenceState"
        );
        assert_eq!(endpoint_name("https://myvoltalis.com/scheduler/updateModeConfig"), "updateModeConfig");
        assert_eq!(endpoint_name("login"), "login");
    }

    #[test]
    fn query_parameter_formats() {
        let ts = Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(epoch_millis(ts), 1_617_235_200_000);
        let day = NaiveDate::from_ymd_opt(2022, 4, 18).unwrap();
        assert_eq!(chart_date(day), "18%2F04%2F2022");
    }

    #[test]
    fn minute_after_rolls_hours_and_clamps_at_midnight() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(minute_after(t(14, 30)), "14:31");
        assert_eq!(minute_after(t(9, 59)), "10:00");
        assert_eq!(minute_after(t(0, 0)), "00:01");
        assert_eq!(minute_after(t(23, 58)), "23:59");
        assert_eq!(minute_after(t(23, 59)), "23:59");
    }
}
