//! The transformation stage: raw sessions in, four derived tables out.
//!
//! Every function here is pure. Input sessions are sorted by
//! (ticker, date) in [`prepare_sessions`]; the per-ticker helpers assume
//! that order.

use crate::core::stats::{count_defined, mean, pearson, round_to, sample_std};
use crate::domain::model::{
    AnalysisResult, AnalysisSettings, CorrelationMatrix, GrowthRecord, PriceRecord, RiskRecord,
    SignalRecord, Trend,
};
use crate::utils::error::{EtlError, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Contiguous run of one ticker's sessions inside the sorted table.
#[derive(Debug, Clone, Copy)]
pub struct TickerSeries<'a> {
    pub ticker: &'a str,
    pub sector: &'a str,
    pub rows: &'a [PriceRecord],
}

impl TickerSeries<'_> {
    pub fn prices(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.price).collect()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.iter().map(|r| r.date)
    }
}

/// Sorts by (ticker, date) and rejects repeated sessions.
pub fn prepare_sessions(mut records: Vec<PriceRecord>) -> Result<Vec<PriceRecord>> {
    records.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));

    if let Some(pair) = records
        .windows(2)
        .find(|w| w[0].ticker == w[1].ticker && w[0].date == w[1].date)
    {
        return Err(EtlError::DuplicateSession {
            ticker: pair[1].ticker.clone(),
            date: pair[1].date.to_string(),
        });
    }

    Ok(records)
}

/// Splits a table sorted by ticker into per-ticker series. The sector is
/// taken from the ticker's first session.
pub fn group_by_ticker(records: &[PriceRecord]) -> Vec<TickerSeries<'_>> {
    let mut groups = Vec::new();
    let mut start = 0;

    while start < records.len() {
        let ticker = records[start].ticker.as_str();
        let len = records[start..]
            .iter()
            .take_while(|r| r.ticker == ticker)
            .count();
        let rows = &records[start..start + len];

        if rows.iter().any(|r| r.sector != rows[0].sector) {
            tracing::warn!(
                "Ticker {} has more than one sector label, using '{}'",
                ticker,
                rows[0].sector
            );
        }

        groups.push(TickerSeries {
            ticker,
            sector: rows[0].sector.as_str(),
            rows,
        });
        start += len;
    }

    groups
}

/// `price[t] / price[t-1] - 1`, with a missing price replaced by the last
/// known one. The first session has no return, nor does any session before
/// the first known price or after a zero price.
pub fn daily_returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut returns = Vec::with_capacity(prices.len());
    let mut last_known: Option<f64> = None;

    for price in prices {
        let current = price.or(last_known);
        let r = match (last_known, current) {
            (Some(prev), Some(curr)) if prev != 0.0 => Some(curr / prev - 1.0),
            _ => None,
        };
        returns.push(r);
        last_known = current;
    }

    returns
}

/// Trailing simple average over `window` sessions including the current one.
/// Undefined until `window` sessions have accumulated, or when any price in
/// the window is missing.
pub fn moving_average(prices: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; prices.len()];
    }

    (0..prices.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &prices[i + 1 - window..=i];
            let sum = slice.iter().try_fold(0.0, |acc, p| p.map(|p| acc + p))?;
            Some(sum / window as f64)
        })
        .collect()
}

/// First matching rule wins: above +threshold, above zero, below -threshold,
/// below zero, otherwise neutral. A missing deviation is neutral.
pub fn classify_trend(ma_diff_pct: Option<f64>, strong_threshold: f64) -> Trend {
    match ma_diff_pct {
        Some(d) if d > strong_threshold => Trend::StrongBullish,
        Some(d) if d > 0.0 => Trend::WeakBullish,
        Some(d) if d < -strong_threshold => Trend::StrongBearish,
        Some(d) if d < 0.0 => Trend::WeakBearish,
        _ => Trend::Neutral,
    }
}

pub fn risk_profile(series: &[TickerSeries<'_>], settings: &AnalysisSettings) -> Vec<RiskRecord> {
    let days = f64::from(settings.trading_days);

    series
        .iter()
        .map(|s| {
            let returns: Vec<f64> = daily_returns(&s.prices()).into_iter().flatten().collect();
            if returns.len() < 2 {
                tracing::debug!(
                    "{} has {} defined returns, risk metrics may be missing",
                    s.ticker,
                    returns.len()
                );
            }

            RiskRecord {
                ticker: s.ticker.to_string(),
                sector: s.sector.to_string(),
                volatility_annual_pct: sample_std(&returns)
                    .map(|sd| round_to(sd * days.sqrt() * 100.0, 2)),
                return_annual_pct: mean(&returns).map(|m| round_to(m * days * 100.0, 2)),
            }
        })
        .collect()
}

/// One row per ticker that has a session on the latest date of the whole table.
pub fn trading_signals(
    series: &[TickerSeries<'_>],
    settings: &AnalysisSettings,
) -> Vec<SignalRecord> {
    let Some(latest) = series.iter().flat_map(|s| s.dates()).max() else {
        return Vec::new();
    };

    series
        .iter()
        .filter_map(|s| {
            let last = s.rows.last()?;
            if last.date != latest {
                tracing::debug!("{} has no session on {}, skipping signal", s.ticker, latest);
                return None;
            }

            let ma50 = moving_average(&s.prices(), settings.ma_window)
                .last()
                .copied()
                .flatten();
            let ma_diff_pct = match (last.price, ma50) {
                (Some(price), Some(ma)) if ma != 0.0 => Some(round_to((price - ma) / ma * 100.0, 2)),
                _ => None,
            };

            Some(SignalRecord {
                ticker: s.ticker.to_string(),
                price: last.price,
                ma50,
                ma_diff_pct,
                trend: classify_trend(ma_diff_pct, settings.strong_threshold),
            })
        })
        .collect()
}

/// Value of a fixed stake compounded by each session's return. The first
/// session is worth exactly the stake; a missing price holds the value flat
/// until the next known price.
pub fn growth_series(series: &[TickerSeries<'_>], settings: &AnalysisSettings) -> Vec<GrowthRecord> {
    let mut growth = Vec::new();

    for s in series {
        let mut cumulative = 1.0;
        for (i, (row, ret)) in s.rows.iter().zip(daily_returns(&s.prices())).enumerate() {
            let value = match ret {
                Some(r) => {
                    cumulative *= 1.0 + r;
                    Some(round_to(cumulative * settings.initial_investment, 0))
                }
                None if i == 0 => Some(round_to(settings.initial_investment, 0)),
                None => None,
            };

            growth.push(GrowthRecord {
                date: row.date,
                ticker: s.ticker.to_string(),
                investment_value: value,
            });
        }
    }

    growth
}

/// Pairwise-complete Pearson correlation of daily returns, tickers in
/// sorted order on both axes.
pub fn correlation_matrix(series: &[TickerSeries<'_>]) -> CorrelationMatrix {
    let mut dates: BTreeMap<NaiveDate, usize> =
        series.iter().flat_map(|s| s.dates()).map(|d| (d, 0)).collect();
    for (idx, slot) in dates.values_mut().enumerate() {
        *slot = idx;
    }

    let mut ordered: Vec<&TickerSeries<'_>> = series.iter().collect();
    ordered.sort_by(|a, b| a.ticker.cmp(b.ticker));

    // date x ticker pivot, one column per ticker
    let columns: Vec<Vec<Option<f64>>> = ordered
        .iter()
        .map(|s| {
            let mut column = vec![None; dates.len()];
            for (date, ret) in s.dates().zip(daily_returns(&s.prices())) {
                column[dates[&date]] = ret;
            }
            column
        })
        .collect();

    let n = columns.len();
    let mut values = vec![vec![None; n]; n];
    for i in 0..n {
        if count_defined(&columns[i]) >= 2 && pearson(&columns[i], &columns[i]).is_some() {
            values[i][i] = Some(1.0);
        }
        for j in (i + 1)..n {
            let corr = pearson(&columns[i], &columns[j]);
            values[i][j] = corr;
            values[j][i] = corr;
        }
    }

    CorrelationMatrix {
        tickers: ordered.iter().map(|s| s.ticker.to_string()).collect(),
        values,
    }
}

/// Runs every derived table over the given sessions.
pub fn analyze(records: Vec<PriceRecord>, settings: &AnalysisSettings) -> Result<AnalysisResult> {
    let records = prepare_sessions(records)?;
    let series = group_by_ticker(&records);

    tracing::debug!(
        "Analyzing {} sessions across {} tickers",
        records.len(),
        series.len()
    );

    Ok(AnalysisResult {
        risk: risk_profile(&series, settings),
        signals: trading_signals(&series, settings),
        growth: growth_series(&series, settings),
        correlation: correlation_matrix(&series),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn session(ticker: &str, day: u32, price: Option<f64>) -> PriceRecord {
        PriceRecord {
            date: date("2024-01-01") + chrono::Days::new(u64::from(day)),
            ticker: ticker.to_string(),
            sector: "IT".to_string(),
            price,
        }
    }

    fn series_of(ticker: &str, prices: &[f64]) -> Vec<PriceRecord> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| session(ticker, i as u32, Some(*p)))
            .collect()
    }

    #[test]
    fn test_daily_returns_first_session_undefined() {
        let returns = daily_returns(&[Some(100.0), Some(110.0), Some(99.0)]);
        assert_eq!(returns.len(), 3);
        assert_eq!(returns[0], None);
        assert!((returns[1].unwrap() - 0.10).abs() < 1e-12);
        assert!((returns[2].unwrap() + 0.10).abs() < 1e-12);
        assert!(daily_returns(&[]).is_empty());
    }

    #[test]
    fn test_daily_returns_carry_last_known_price() {
        let returns = daily_returns(&[Some(100.0), None, Some(120.0), Some(132.0)]);
        assert_eq!(returns[0], None);
        assert_eq!(returns[1], Some(0.0));
        assert!((returns[2].unwrap() - 0.20).abs() < 1e-12);
        assert!((returns[3].unwrap() - 0.10).abs() < 1e-12);

        let leading_gap = daily_returns(&[None, Some(100.0), Some(110.0)]);
        assert_eq!(leading_gap[0], None);
        assert_eq!(leading_gap[1], None);
        assert!((leading_gap[2].unwrap() - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_moving_average_window() {
        let prices: Vec<Option<f64>> = (1..=5).map(|p| Some(p as f64)).collect();
        let ma = moving_average(&prices, 3);
        assert_eq!(ma, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);

        let with_gap = [Some(1.0), None, Some(3.0), Some(4.0)];
        assert_eq!(moving_average(&with_gap, 2), vec![None, None, None, Some(3.5)]);
    }

    #[test]
    fn test_classify_trend_first_match() {
        assert_eq!(classify_trend(Some(2.01), 2.0), Trend::StrongBullish);
        assert_eq!(classify_trend(Some(2.0), 2.0), Trend::WeakBullish);
        assert_eq!(classify_trend(Some(0.5), 2.0), Trend::WeakBullish);
        assert_eq!(classify_trend(Some(0.0), 2.0), Trend::Neutral);
        assert_eq!(classify_trend(Some(-1.0), 2.0), Trend::WeakBearish);
        assert_eq!(classify_trend(Some(-2.0), 2.0), Trend::WeakBearish);
        assert_eq!(classify_trend(Some(-2.5), 2.0), Trend::StrongBearish);
        assert_eq!(classify_trend(None, 2.0), Trend::Neutral);
    }

    #[test]
    fn test_prepare_sessions_sorts_and_rejects_duplicates() {
        let records = vec![session("B", 1, Some(1.0)), session("A", 2, Some(1.0)), session("A", 0, Some(1.0))];
        let sorted = prepare_sessions(records).unwrap();
        let keys: Vec<(&str, NaiveDate)> = sorted.iter().map(|r| (r.ticker.as_str(), r.date)).collect();
        assert_eq!(
            keys,
            vec![("A", date("2024-01-01")), ("A", date("2024-01-03")), ("B", date("2024-01-02"))]
        );

        let duplicated = vec![session("A", 0, Some(1.0)), session("A", 0, Some(2.0))];
        assert!(matches!(
            prepare_sessions(duplicated),
            Err(EtlError::DuplicateSession { .. })
        ));
    }

    #[test]
    fn test_risk_profile_annualization() {
        let records = prepare_sessions(series_of("A", &[100.0, 102.0, 100.98, 103.0])).unwrap();
        let series = group_by_ticker(&records);
        let risk = risk_profile(&series, &AnalysisSettings::default());

        let returns: Vec<f64> = daily_returns(&series[0].prices()).into_iter().flatten().collect();
        let expected_vol = round_to(sample_std(&returns).unwrap() * 252f64.sqrt() * 100.0, 2);
        let expected_ret = round_to(mean(&returns).unwrap() * 252.0 * 100.0, 2);

        assert_eq!(risk.len(), 1);
        assert_eq!(risk[0].sector, "IT");
        assert_eq!(risk[0].volatility_annual_pct, Some(expected_vol));
        assert_eq!(risk[0].return_annual_pct, Some(expected_ret));
    }

    #[test]
    fn test_risk_profile_single_session_is_missing() {
        let records = series_of("A", &[100.0]);
        let series = group_by_ticker(&records);
        let risk = risk_profile(&series, &AnalysisSettings::default());
        assert_eq!(risk[0].volatility_annual_pct, None);
        assert_eq!(risk[0].return_annual_pct, None);
    }

    #[test]
    fn test_signals_only_for_latest_date() {
        let settings = AnalysisSettings {
            ma_window: 3,
            ..AnalysisSettings::default()
        };
        let mut records = series_of("A", &[10.0, 10.0, 10.0, 11.0]);
        // B stops one session early and must be excluded.
        records.extend(series_of("B", &[10.0, 10.0, 10.0]));
        let records = prepare_sessions(records).unwrap();
        let series = group_by_ticker(&records);

        let signals = trading_signals(&series, &settings);
        assert_eq!(signals.len(), 1);
        let a = &signals[0];
        assert_eq!(a.ticker, "A");
        assert_eq!(a.price, Some(11.0));
        let ma = a.ma50.unwrap();
        assert!((ma - 31.0 / 3.0).abs() < 1e-12);
        assert_eq!(a.ma_diff_pct, Some(round_to((11.0 - ma) / ma * 100.0, 2)));
        assert_eq!(a.trend, Trend::StrongBullish);
    }

    #[test]
    fn test_signal_without_enough_history_is_neutral() {
        let records = series_of("A", &[10.0, 11.0]);
        let series = group_by_ticker(&records);
        let signals = trading_signals(&series, &AnalysisSettings::default());
        assert_eq!(signals[0].ma50, None);
        assert_eq!(signals[0].ma_diff_pct, None);
        assert_eq!(signals[0].trend, Trend::Neutral);
    }

    #[test]
    fn test_growth_starts_clean_and_compounds() {
        let records = series_of("A", &[50.0, 55.0, 49.5]);
        let series = group_by_ticker(&records);
        let growth = growth_series(&series, &AnalysisSettings::default());

        let values: Vec<Option<f64>> = growth.iter().map(|g| g.investment_value).collect();
        assert_eq!(values, vec![Some(100_000.0), Some(110_000.0), Some(99_000.0)]);
        assert_eq!(growth[0].date, date("2024-01-01"));
    }

    #[test]
    fn test_missing_price_holds_growth_and_keeps_risk() {
        let with_gap = vec![
            session("A", 0, Some(100.0)),
            session("A", 1, Some(110.0)),
            session("A", 2, None),
            session("A", 3, Some(120.0)),
            session("A", 4, Some(132.0)),
        ];
        let series = group_by_ticker(&with_gap);
        let settings = AnalysisSettings::default();

        let values: Vec<Option<f64>> = growth_series(&series, &settings)
            .iter()
            .map(|g| g.investment_value)
            .collect();
        assert_eq!(
            values,
            vec![
                Some(100_000.0),
                Some(110_000.0),
                Some(110_000.0),
                Some(120_000.0),
                Some(132_000.0)
            ]
        );

        let expected: Vec<f64> = vec![110.0 / 100.0 - 1.0, 0.0, 120.0 / 110.0 - 1.0, 132.0 / 120.0 - 1.0];
        let risk = risk_profile(&series, &settings);
        assert_eq!(
            risk[0].volatility_annual_pct,
            Some(round_to(sample_std(&expected).unwrap() * 252f64.sqrt() * 100.0, 2))
        );
        assert_ne!(risk[0].volatility_annual_pct, Some(0.0));
    }

    #[test]
    fn test_constant_price_has_no_self_correlation() {
        let mut records = series_of("FLAT", &[50.0, 50.0, 50.0, 50.0]);
        records.extend(series_of("MOVE", &[10.0, 11.0, 10.5, 12.0]));
        let records = prepare_sessions(records).unwrap();
        let series = group_by_ticker(&records);
        let matrix = correlation_matrix(&series);

        // three zero returns: defined, but no variance to correlate
        assert_eq!(matrix.get("FLAT", "FLAT"), None);
        assert_eq!(matrix.get("FLAT", "MOVE"), None);
        assert_eq!(matrix.get("MOVE", "FLAT"), None);
        assert_eq!(matrix.get("MOVE", "MOVE"), Some(1.0));
    }

    #[test]
    fn test_correlation_matrix_symmetric_with_unit_diagonal() {
        let mut records = series_of("B", &[10.0, 11.0, 10.5, 12.0, 11.0]);
        records.extend(series_of("A", &[20.0, 22.0, 21.0, 24.0, 22.0]));
        records.extend(series_of("C", &[5.0, 4.8, 5.1, 4.7, 5.3]));
        let records = prepare_sessions(records).unwrap();
        let series = group_by_ticker(&records);
        let matrix = correlation_matrix(&series);

        assert_eq!(matrix.tickers, vec!["A", "B", "C"]);
        for i in 0..3 {
            assert_eq!(matrix.values[i][i], Some(1.0));
            for j in 0..3 {
                assert_eq!(matrix.values[i][j], matrix.values[j][i]);
            }
        }
        // A is B scaled by two, so their returns are identical.
        assert!((matrix.get("A", "B").unwrap() - 1.0).abs() < 1e-9);
        assert!(matrix.get("A", "C").unwrap() < 0.0);
    }

    #[test]
    fn test_correlation_short_series_is_missing() {
        let mut records = series_of("A", &[10.0, 11.0]);
        records.extend(series_of("B", &[10.0, 11.0, 12.0, 11.0]));
        let records = prepare_sessions(records).unwrap();
        let series = group_by_ticker(&records);
        let matrix = correlation_matrix(&series);

        assert_eq!(matrix.get("A", "A"), None);
        assert_eq!(matrix.get("A", "B"), None);
        assert_eq!(matrix.get("B", "B"), Some(1.0));
    }

    #[test]
    fn test_analyze_is_order_independent() {
        let mut records = series_of("A", &[100.0, 101.0, 99.0, 103.0, 104.0]);
        records.extend(series_of("B", &[50.0, 49.0, 51.0, 52.0, 50.0]));
        let mut shuffled = records.clone();
        shuffled.reverse();

        let settings = AnalysisSettings::default();
        let first = analyze(records, &settings).unwrap();
        let second = analyze(shuffled, &settings).unwrap();
        assert_eq!(first, second);
    }
}
