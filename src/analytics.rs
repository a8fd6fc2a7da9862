//! Click analytics over the links of an owner

use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Serialize;

use crate::links::Click;
use crate::links::Link;

/// Number of countries in the top list
pub const TOP_COUNTRIES: usize = 5;

/// Number of days in the daily window, today included
pub const DAILY_WINDOW_DAYS: i64 = 7;

/// Clicks from a single country
#[derive(Debug, PartialEq, Serialize)]
pub struct CountryClicks {
    pub country: String,
    pub clicks: u64,
}

/// Clicks on a single UTC day
#[derive(Debug, PartialEq, Serialize)]
pub struct DailyClicks {
    /// `YYYY-MM-DD`
    pub date: String,
    pub clicks: u64,
}

/// Summary of all links of an owner, deleted ones included
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_links: u64,
    pub active_links: u64,
    pub total_clicks: i64,

    /// Rounded to 2 decimals
    pub average_clicks_per_link: f64,

    /// Most clicks first, ties by country code
    pub top_countries: Vec<CountryClicks>,

    /// Oldest day first, only days with clicks
    pub daily_clicks: Vec<DailyClicks>,
}

/// Summarize links and their click logs as seen at `now`
pub fn summarize(links: &[Link], clicks: &[Click], now: DateTime<Utc>) -> Summary {
    let total_links = links.len() as u64;
    let active_links = links.iter().filter(|link| link.active).count() as u64;
    let total_clicks = links.iter().map(|link| link.click_count).sum::<i64>();

    Summary {
        total_links,
        active_links,
        total_clicks,
        average_clicks_per_link: average(total_clicks, total_links),
        top_countries: top_countries(clicks),
        daily_clicks: daily_clicks(clicks, now),
    }
}

#[allow(clippy::cast_precision_loss)] // counts stay far below 2^52
fn average(total_clicks: i64, total_links: u64) -> f64 {
    if total_links == 0 {
        return 0.0;
    }

    let average = total_clicks as f64 / total_links as f64;

    (average * 100.0).round() / 100.0
}

fn top_countries(clicks: &[Click]) -> Vec<CountryClicks> {
    let mut per_country = HashMap::<&str, u64>::new();

    for click in clicks {
        *per_country.entry(click.country.as_str()).or_default() += 1;
    }

    let mut countries = per_country
        .into_iter()
        .map(|(country, clicks)| CountryClicks {
            country: country.to_string(),
            clicks,
        })
        .collect::<Vec<_>>();

    countries.sort_by(|a, b| b.clicks.cmp(&a.clicks).then_with(|| a.country.cmp(&b.country)));
    countries.truncate(TOP_COUNTRIES);

    countries
}

fn daily_clicks(clicks: &[Click], now: DateTime<Utc>) -> Vec<DailyClicks> {
    let today = now.date_naive();
    let first_day = today - Duration::days(DAILY_WINDOW_DAYS - 1);

    let mut per_day = BTreeMap::new();

    for click in clicks {
        let day = click.clicked_at.date_naive();

        if day >= first_day && day <= today {
            *per_day.entry(day).or_insert(0) += 1;
        }
    }

    per_day
        .into_iter()
        .map(|(day, clicks)| DailyClicks {
            date: day.format("%Y-%m-%d").to_string(),
            clicks,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::links::LinkKind;

    use super::*;

    fn link(click_count: i64, active: bool) -> Link {
        Link {
            id: Uuid::new_v4(),
            code: Uuid::new_v4().to_string(),
            destination: "https://example.com/".to_string(),
            owner_id: None,
            kind: LinkKind::Standard,
            qr_code: None,
            click_count,
            active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn click(country: &str, clicked_at: DateTime<Utc>) -> Click {
        Click {
            clicked_at,
            country: country.to_string(),
        }
    }

    #[test]
    fn test_empty() {
        let summary = summarize(&[], &[], Utc::now());

        assert_eq!(0, summary.total_links);
        assert_eq!(0, summary.total_clicks);
        assert!((summary.average_clicks_per_link - 0.0).abs() < f64::EPSILON);
        assert!(summary.top_countries.is_empty());
        assert!(summary.daily_clicks.is_empty());
    }

    #[test]
    fn test_totals_and_average() {
        let links = [link(1, true), link(0, false), link(1, true)];

        let summary = summarize(&links, &[], Utc::now());

        assert_eq!(3, summary.total_links);
        assert_eq!(2, summary.active_links);
        assert_eq!(2, summary.total_clicks);
        assert!((summary.average_clicks_per_link - 0.67).abs() < f64::EPSILON);
    }

    #[test]
    fn test_top_countries() {
        let now = Utc::now();
        let clicks = ["US", "IN", "US", "FR", "DE", "GB", "NL", "IN", "US", "BE"]
            .iter()
            .map(|country| click(country, now))
            .collect::<Vec<_>>();

        let summary = summarize(&[], &clicks, now);

        let top = summary
            .top_countries
            .iter()
            .map(|country| (country.country.as_str(), country.clicks))
            .collect::<Vec<_>>();

        assert_eq!(
            vec![("US", 3), ("IN", 2), ("BE", 1), ("DE", 1), ("FR", 1)],
            top
        );
    }

    #[test]
    fn test_daily_window() {
        let now = "2026-10-16T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let clicks = [
            click("US", now),
            click("US", now - Duration::hours(13)),
            click("US", now - Duration::days(6)),
            click("US", now - Duration::days(7)),
            click("US", now - Duration::days(30)),
        ];

        let summary = summarize(&[], &clicks, now);

        assert_eq!(
            vec![
                DailyClicks {
                    date: "2026-10-10".to_string(),
                    clicks: 1,
                },
                DailyClicks {
                    date: "2026-10-15".to_string(),
                    clicks: 1,
                },
                DailyClicks {
                    date: "2026-10-16".to_string(),
                    clicks: 1,
                },
            ],
            summary.daily_clicks
        );
    }
}
