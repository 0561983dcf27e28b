//! Read-side aggregations: daily activity for calendar heatmaps and
//! win/loss/draw breakdowns by color and by account. Aggregation happens in
//! SQL; queries are assembled with `QueryBuilder`, and every filter is
//! nullable, keeping the `(bind IS NULL OR col = bind)` shape so one
//! statement serves all filter combinations.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use sqlx::QueryBuilder;

use crate::db::Db;
use crate::model::{Color, GameResult, Platform, TimeControlCategory};

/// Optional filters shared by the analytics queries.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsFilter {
    pub account_ids: Option<Vec<i64>>,
    pub time_control: Option<TimeControlCategory>,
    pub color: Option<Color>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColorStats {
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ByColor {
    pub white: ColorStats,
    pub black: ColorStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountStats {
    pub account_id: i64,
    pub username: String,
    pub platform: Platform,
    pub label: Option<String>,
    pub total: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_games: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    /// Absent when the request already filters by a single color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_color: Option<ByColor>,
    pub by_account: Vec<AccountStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDayAccount {
    pub account_id: i64,
    pub username: String,
    pub platform: Platform,
    pub label: Option<String>,
    pub count: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub count: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub by_account: Vec<CalendarDayAccount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarYear {
    pub year: i32,
    pub total_games: i64,
    pub active_days: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub days: Vec<CalendarDay>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarSummary {
    pub total_games: i64,
    pub total_wins: i64,
    pub total_losses: i64,
    pub total_draws: i64,
    pub active_days: i64,
    pub year_range: String,
    pub account_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarResponse {
    /// Most recent year first; days ascending within a year.
    pub years: Vec<CalendarYear>,
    pub summary: CalendarSummary,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DailyRow {
    day: NaiveDate,
    account_id: i64,
    username: String,
    platform: Platform,
    label: Option<String>,
    count: i64,
    wins: i64,
    losses: i64,
    draws: i64,
}

/// Half-open [from, to) timestamp bounds from the inclusive date filters.
fn date_bounds(filter: &AnalyticsFilter) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    let from = filter
        .from
        .map(|d| NaiveDateTime::new(d, NaiveTime::MIN));
    let to = filter
        .to
        .map(|d| NaiveDateTime::new(d.succ_opt().unwrap_or(d), NaiveTime::MIN));
    (from, to)
}

/// Appends the nullable filter predicates to a query under construction.
/// Each filter keeps the `(bind IS NULL OR column = bind)` shape, so a null
/// filter matches every row; the null-side bind carries an explicit cast so
/// Postgres can type the placeholder. `prefix` qualifies the game columns
/// when the query joins other tables.
fn push_filters(qb: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &AnalyticsFilter, prefix: &str) {
    let (from, to) = date_bounds(filter);

    qb.push("(");
    qb.push_bind(filter.account_ids.clone());
    qb.push("::bigint[] IS NULL OR ");
    qb.push(prefix);
    qb.push("account_id = ANY(");
    qb.push_bind(filter.account_ids.clone());
    qb.push("))");

    qb.push(" AND (");
    qb.push_bind(filter.time_control);
    qb.push("::time_control_category IS NULL OR ");
    qb.push(prefix);
    qb.push("time_control_category = ");
    qb.push_bind(filter.time_control);
    qb.push(")");

    qb.push(" AND (");
    qb.push_bind(filter.color);
    qb.push("::color IS NULL OR ");
    qb.push(prefix);
    qb.push("color = ");
    qb.push_bind(filter.color);
    qb.push(")");

    qb.push(" AND (");
    qb.push_bind(from);
    qb.push("::timestamp IS NULL OR ");
    qb.push(prefix);
    qb.push("played_at >= ");
    qb.push_bind(from);
    qb.push(")");

    qb.push(" AND (");
    qb.push_bind(to);
    qb.push("::timestamp IS NULL OR ");
    qb.push(prefix);
    qb.push("played_at < ");
    qb.push_bind(to);
    qb.push(")");
}

/// Aggregated win/loss/draw statistics under the given filters.
pub async fn stats(db: &Db, filter: &AnalyticsFilter) -> Result<StatsResponse> {
    let mut qb: QueryBuilder<'_, sqlx::Postgres> =
        QueryBuilder::new("SELECT result, COUNT(*) FROM game WHERE ");
    push_filters(&mut qb, filter, "");
    qb.push(" GROUP BY result");
    let result_counts: Vec<(GameResult, i64)> =
        qb.build_query_as().fetch_all(&db.pool).await?;

    let mut wins = 0;
    let mut losses = 0;
    let mut draws = 0;
    for (result, count) in result_counts {
        match result {
            GameResult::Win => wins = count,
            GameResult::Loss => losses = count,
            GameResult::Draw => draws = count,
        }
    }

    // The per-color breakdown only makes sense when not already filtered to
    // one color; with color unset its predicate matches everything.
    let by_color = if filter.color.is_none() {
        let mut qb: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new("SELECT color, result, COUNT(*) FROM game WHERE ");
        push_filters(&mut qb, filter, "");
        qb.push(" GROUP BY color, result");
        let color_counts: Vec<(Color, GameResult, i64)> =
            qb.build_query_as().fetch_all(&db.pool).await?;

        let mut white = ColorStats {
            wins: 0,
            losses: 0,
            draws: 0,
        };
        let mut black = white.clone();
        for (color, result, count) in color_counts {
            let bucket = match color {
                Color::White => &mut white,
                Color::Black => &mut black,
            };
            match result {
                GameResult::Win => bucket.wins = count,
                GameResult::Loss => bucket.losses = count,
                GameResult::Draw => bucket.draws = count,
            }
        }
        Some(ByColor { white, black })
    } else {
        None
    };

    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "SELECT g.account_id, a.username, a.platform, a.label, \
         COUNT(*) AS total, \
         COUNT(*) FILTER (WHERE g.result = 'WIN') AS wins, \
         COUNT(*) FILTER (WHERE g.result = 'LOSS') AS losses, \
         COUNT(*) FILTER (WHERE g.result = 'DRAW') AS draws \
         FROM game g JOIN account a ON a.id = g.account_id WHERE ",
    );
    push_filters(&mut qb, filter, "g.");
    qb.push(" GROUP BY g.account_id, a.username, a.platform, a.label ORDER BY total DESC");
    let account_rows: Vec<AccountStatsRow> = qb.build_query_as().fetch_all(&db.pool).await?;
    let by_account = account_rows.into_iter().map(AccountStats::from).collect();

    Ok(StatsResponse {
        total_games: wins + losses + draws,
        wins,
        losses,
        draws,
        by_color,
        by_account,
    })
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AccountStatsRow {
    account_id: i64,
    username: String,
    platform: Platform,
    label: Option<String>,
    total: i64,
    wins: i64,
    losses: i64,
    draws: i64,
}

impl From<AccountStatsRow> for AccountStats {
    fn from(row: AccountStatsRow) -> Self {
        Self {
            account_id: row.account_id,
            username: row.username,
            platform: row.platform,
            label: row.label,
            total: row.total,
            wins: row.wins,
            losses: row.losses,
            draws: row.draws,
        }
    }
}

/// Multi-year calendar data with per-day and per-account breakdowns.
pub async fn calendar(db: &Db, filter: &AnalyticsFilter) -> Result<CalendarResponse> {
    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
        "SELECT g.played_at::date AS day, g.account_id, a.username, a.platform, a.label, \
         COUNT(*) AS count, \
         COUNT(*) FILTER (WHERE g.result = 'WIN') AS wins, \
         COUNT(*) FILTER (WHERE g.result = 'LOSS') AS losses, \
         COUNT(*) FILTER (WHERE g.result = 'DRAW') AS draws \
         FROM game g JOIN account a ON a.id = g.account_id WHERE ",
    );
    push_filters(&mut qb, filter, "g.");
    qb.push(" GROUP BY day, g.account_id, a.username, a.platform, a.label ORDER BY day");
    let rows: Vec<DailyRow> = qb.build_query_as().fetch_all(&db.pool).await?;

    Ok(build_calendar(rows))
}

/// Pure shaping of daily per-account rows into the year/day/account tree.
fn build_calendar(rows: Vec<DailyRow>) -> CalendarResponse {
    let mut days: BTreeMap<NaiveDate, Vec<DailyRow>> = BTreeMap::new();
    let mut account_ids = std::collections::HashSet::new();
    for row in rows {
        account_ids.insert(row.account_id);
        days.entry(row.day).or_default().push(row);
    }

    let mut years: BTreeMap<i32, CalendarYear> = BTreeMap::new();
    let mut summary = CalendarSummary {
        total_games: 0,
        total_wins: 0,
        total_losses: 0,
        total_draws: 0,
        active_days: 0,
        year_range: String::new(),
        account_count: account_ids.len() as i64,
    };

    for (date, day_rows) in days {
        let mut day = CalendarDay {
            date,
            count: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            by_account: Vec::with_capacity(day_rows.len()),
        };
        for row in day_rows {
            day.count += row.count;
            day.wins += row.wins;
            day.losses += row.losses;
            day.draws += row.draws;
            day.by_account.push(CalendarDayAccount {
                account_id: row.account_id,
                username: row.username,
                platform: row.platform,
                label: row.label,
                count: row.count,
                wins: row.wins,
                losses: row.losses,
                draws: row.draws,
            });
        }

        summary.total_games += day.count;
        summary.total_wins += day.wins;
        summary.total_losses += day.losses;
        summary.total_draws += day.draws;
        summary.active_days += 1;

        let year = years.entry(date.year()).or_insert_with(|| CalendarYear {
            year: date.year(),
            total_games: 0,
            active_days: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            days: Vec::new(),
        });
        year.total_games += day.count;
        year.active_days += 1;
        year.wins += day.wins;
        year.losses += day.losses;
        year.draws += day.draws;
        year.days.push(day);
    }

    let years: Vec<CalendarYear> = years.into_values().rev().collect();
    summary.year_range = match (years.last(), years.first()) {
        (Some(oldest), Some(newest)) if oldest.year != newest.year => {
            format!("{}-{}", oldest.year, newest.year)
        }
        (Some(only), _) => only.year.to_string(),
        _ => String::new(),
    };

    CalendarResponse { years, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        day: (i32, u32, u32),
        account_id: i64,
        count: i64,
        wins: i64,
        losses: i64,
        draws: i64,
    ) -> DailyRow {
        DailyRow {
            day: NaiveDate::from_ymd_opt(day.0, day.1, day.2).unwrap(),
            account_id,
            username: format!("user{account_id}"),
            platform: Platform::Lichess,
            label: None,
            count,
            wins,
            losses,
            draws,
        }
    }

    #[test]
    fn empty_rows_build_an_empty_calendar() {
        let calendar = build_calendar(Vec::new());
        assert!(calendar.years.is_empty());
        assert_eq!(calendar.summary.total_games, 0);
        assert_eq!(calendar.summary.year_range, "");
    }

    #[test]
    fn groups_days_under_years_most_recent_first() {
        let rows = vec![
            row((2023, 12, 31), 1, 4, 2, 1, 1),
            row((2024, 1, 1), 1, 3, 1, 2, 0),
            row((2024, 1, 2), 1, 2, 2, 0, 0),
        ];
        let calendar = build_calendar(rows);

        assert_eq!(calendar.years.len(), 2);
        assert_eq!(calendar.years[0].year, 2024);
        assert_eq!(calendar.years[1].year, 2023);
        assert_eq!(calendar.years[0].days.len(), 2);
        // Days ascend within a year.
        assert!(calendar.years[0].days[0].date < calendar.years[0].days[1].date);
        assert_eq!(calendar.summary.total_games, 9);
        assert_eq!(calendar.summary.active_days, 3);
        assert_eq!(calendar.summary.year_range, "2023-2024");
    }

    #[test]
    fn merges_accounts_within_a_day() {
        let rows = vec![
            row((2024, 5, 1), 1, 3, 3, 0, 0),
            row((2024, 5, 1), 2, 2, 0, 1, 1),
        ];
        let calendar = build_calendar(rows);

        assert_eq!(calendar.years.len(), 1);
        let day = &calendar.years[0].days[0];
        assert_eq!(day.count, 5);
        assert_eq!(day.wins, 3);
        assert_eq!(day.by_account.len(), 2);
        assert_eq!(calendar.summary.account_count, 2);
        assert_eq!(calendar.summary.year_range, "2024");
    }
}
