//! Market overview over the published tables: the KPI counts, top momentum
//! pick, wealth-growth leaders and correlation grid that the dashboard shows.

use crate::core::stats::round_to;
use crate::core::tables::{correlation_from_csv, from_csv};
use crate::core::{
    CorrelationMatrix, GrowthRecord, OutputFiles, RiskRecord, SignalRecord, Storage, Trend,
};
use crate::utils::error::{EtlError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write;

pub const MIN_TOP_N: usize = 3;
pub const MAX_TOP_N: usize = 10;
pub const DEFAULT_TOP_N: usize = 5;

/// The four tables as published by a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PublishedTables {
    pub risk: Vec<RiskRecord>,
    pub signals: Vec<SignalRecord>,
    pub growth: Vec<GrowthRecord>,
    pub correlation: CorrelationMatrix,
}

impl PublishedTables {
    pub async fn load<S: Storage>(storage: &S, files: &OutputFiles) -> Result<Self> {
        Ok(Self {
            risk: from_csv(&read_table(storage, &files.risk).await?)?,
            signals: from_csv(&read_table(storage, &files.signals).await?)?,
            growth: from_csv(&read_table(storage, &files.growth).await?)?,
            correlation: correlation_from_csv(&read_table(storage, &files.correlation).await?)?,
        })
    }
}

async fn read_table<S: Storage>(storage: &S, name: &str) -> Result<Vec<u8>> {
    storage.read_file(name).await.map_err(|e| match e {
        EtlError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            EtlError::DataUnavailable {
                path: name.to_string(),
                reason: "output table not found, run the pipeline first".to_string(),
            }
        }
        other => other,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryFilter {
    /// `None` keeps every sector.
    pub sectors: Option<BTreeSet<String>>,
    /// `None` keeps every trend.
    pub trends: Option<BTreeSet<Trend>>,
    pub top_n: usize,
}

impl Default for SummaryFilter {
    fn default() -> Self {
        Self {
            sectors: None,
            trends: None,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl SummaryFilter {
    pub fn top_n(&self) -> usize {
        self.top_n.clamp(MIN_TOP_N, MAX_TOP_N)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPick {
    pub ticker: String,
    pub ma_diff_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
    pub top_pick: Option<TopPick>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthLeader {
    pub ticker: String,
    pub ma_diff_pct: Option<f64>,
    pub last_date: Option<NaiveDate>,
    pub final_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub overview: MarketOverview,
    pub signals: Vec<SignalRecord>,
    pub risk: Vec<RiskRecord>,
    pub leaders: Vec<GrowthLeader>,
    pub correlation: CorrelationMatrix,
}

pub fn filter_risk<'a>(risk: &'a [RiskRecord], filter: &SummaryFilter) -> Vec<&'a RiskRecord> {
    risk.iter()
        .filter(|r| filter.sectors.as_ref().is_none_or(|s| s.contains(&r.sector)))
        .collect()
}

pub fn filter_signals<'a>(
    signals: &'a [SignalRecord],
    filter: &SummaryFilter,
) -> Vec<&'a SignalRecord> {
    signals
        .iter()
        .filter(|s| filter.trends.as_ref().is_none_or(|t| t.contains(&s.trend)))
        .collect()
}

/// Highest deviation first; rows without a deviation go last, ties keep
/// their table order.
pub fn rank_by_momentum<'a>(signals: impl IntoIterator<Item = &'a SignalRecord>) -> Vec<&'a SignalRecord> {
    let mut ranked: Vec<&SignalRecord> = signals.into_iter().collect();
    ranked.sort_by(|a, b| match (a.ma_diff_pct, b.ma_diff_pct) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked
}

pub fn market_overview(signals: &[&SignalRecord]) -> MarketOverview {
    let bullish = signals.iter().filter(|s| s.trend.is_bullish()).count();
    let bearish = signals.iter().filter(|s| s.trend.is_bearish()).count();

    MarketOverview {
        bullish,
        bearish,
        neutral: signals.len() - bullish - bearish,
        top_pick: rank_by_momentum(signals.iter().copied())
            .first()
            .map(|s| TopPick {
                ticker: s.ticker.clone(),
                ma_diff_pct: s.ma_diff_pct,
            }),
    }
}

/// Final investment value of the `n` highest-momentum tickers. Ranking uses
/// every signal, not the trend-filtered subset.
pub fn growth_leaders(signals: &[SignalRecord], growth: &[GrowthRecord], n: usize) -> Vec<GrowthLeader> {
    rank_by_momentum(signals)
        .into_iter()
        .take(n)
        .map(|s| {
            let last = growth
                .iter()
                .filter(|g| g.ticker == s.ticker && g.investment_value.is_some())
                .max_by_key(|g| g.date);
            GrowthLeader {
                ticker: s.ticker.clone(),
                ma_diff_pct: s.ma_diff_pct,
                last_date: last.map(|g| g.date),
                final_value: last.and_then(|g| g.investment_value),
            }
        })
        .collect()
}

/// Correlations at two decimals, as the heatmap annotates them.
pub fn rounded_correlation(matrix: &CorrelationMatrix) -> CorrelationMatrix {
    CorrelationMatrix {
        tickers: matrix.tickers.clone(),
        values: matrix
            .values
            .iter()
            .map(|row| row.iter().map(|v| v.map(|c| round_to(c, 2))).collect())
            .collect(),
    }
}

pub fn build_summary(tables: &PublishedTables, filter: &SummaryFilter) -> Summary {
    let signals = filter_signals(&tables.signals, filter);

    Summary {
        overview: market_overview(&signals),
        signals: rank_by_momentum(signals).into_iter().cloned().collect(),
        risk: filter_risk(&tables.risk, filter).into_iter().cloned().collect(),
        leaders: growth_leaders(&tables.signals, &tables.growth, filter.top_n()),
        correlation: rounded_correlation(&tables.correlation),
    }
}

fn pct(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}%", v)).unwrap_or_else(|| "n/a".to_string())
}

pub fn render_text(summary: &Summary) -> String {
    let mut out = String::new();
    let o = &summary.overview;

    let _ = writeln!(out, "🚦 Market Overview");
    let _ = writeln!(out, "  Bullish: {}  Bearish: {}  Neutral: {}", o.bullish, o.bearish, o.neutral);
    if let Some(pick) = &o.top_pick {
        let _ = writeln!(out, "  Top Momentum: {} ({})", pick.ticker, pct(pick.ma_diff_pct));
    }

    let _ = writeln!(out, "\n📋 Trading Signals");
    for s in &summary.signals {
        let _ = writeln!(
            out,
            "  {:<14} {:>10} {:>10} {:>9}  {}",
            s.ticker,
            s.price.map(|p| format!("{:.2}", p)).unwrap_or_default(),
            s.ma50.map(|p| format!("{:.2}", p)).unwrap_or_default(),
            pct(s.ma_diff_pct),
            s.trend
        );
    }

    let _ = writeln!(out, "\n⚖️ Risk vs Return");
    for r in &summary.risk {
        let _ = writeln!(
            out,
            "  {:<14} {:<10} vol {:>9}  return {:>9}",
            r.ticker,
            r.sector,
            pct(r.volatility_annual_pct),
            pct(r.return_annual_pct)
        );
    }

    let _ = writeln!(out, "\n💰 Wealth Growth (top {} momentum)", summary.leaders.len());
    for l in &summary.leaders {
        let value = l
            .final_value
            .map(|v| format!("{:.0}", v))
            .unwrap_or_else(|| "n/a".to_string());
        let date = l.last_date.map(|d| d.to_string()).unwrap_or_default();
        let _ = writeln!(out, "  {:<14} {:>12}  {}", l.ticker, value, date);
    }

    let c = &summary.correlation;
    let _ = writeln!(out, "\n🔗 Correlation Matrix");
    let _ = write!(out, "  {:<14}", "");
    for ticker in &c.tickers {
        let _ = write!(out, " {:>14}", ticker);
    }
    let _ = writeln!(out);
    for (ticker, row) in c.tickers.iter().zip(&c.values) {
        let _ = write!(out, "  {:<14}", ticker);
        for v in row {
            let cell = v.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string());
            let _ = write!(out, " {:>14}", cell);
        }
        let _ = writeln!(out);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(ticker: &str, diff: Option<f64>, trend: Trend) -> SignalRecord {
        SignalRecord {
            ticker: ticker.to_string(),
            price: Some(100.0),
            ma50: Some(100.0),
            ma_diff_pct: diff,
            trend,
        }
    }

    fn risk(ticker: &str, sector: &str) -> RiskRecord {
        RiskRecord {
            ticker: ticker.to_string(),
            sector: sector.to_string(),
            volatility_annual_pct: Some(20.0),
            return_annual_pct: Some(10.0),
        }
    }

    fn growth(ticker: &str, day: u32, value: Option<f64>) -> GrowthRecord {
        GrowthRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            ticker: ticker.to_string(),
            investment_value: value,
        }
    }

    fn tables() -> PublishedTables {
        PublishedTables {
            risk: vec![risk("A", "IT"), risk("B", "Auto"), risk("C", "IT")],
            signals: vec![
                signal("A", Some(3.1), Trend::StrongBullish),
                signal("B", Some(-0.4), Trend::WeakBearish),
                signal("C", None, Trend::Neutral),
                signal("D", Some(0.8), Trend::WeakBullish),
            ],
            growth: vec![
                growth("A", 1, Some(100_000.0)),
                growth("A", 2, Some(104_000.0)),
                growth("D", 1, Some(100_000.0)),
                growth("D", 2, Some(99_000.0)),
                growth("D", 3, None),
            ],
            correlation: CorrelationMatrix {
                tickers: vec!["A".to_string(), "D".to_string()],
                values: vec![vec![Some(1.0), Some(0.41666)], vec![Some(0.41666), None]],
            },
        }
    }

    #[test]
    fn test_overview_counts_and_top_pick() {
        let t = tables();
        let all: Vec<&SignalRecord> = t.signals.iter().collect();
        let overview = market_overview(&all);
        assert_eq!(overview.bullish, 2);
        assert_eq!(overview.bearish, 1);
        assert_eq!(overview.neutral, 1);
        assert_eq!(overview.top_pick.unwrap().ticker, "A");
    }

    #[test]
    fn test_overview_of_nothing() {
        let overview = market_overview(&[]);
        assert_eq!(overview.bullish + overview.bearish + overview.neutral, 0);
        assert!(overview.top_pick.is_none());
    }

    #[test]
    fn test_rank_puts_missing_deviation_last() {
        let t = tables();
        let ranked: Vec<&str> = rank_by_momentum(&t.signals).iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(ranked, vec!["A", "D", "B", "C"]);
    }

    #[test]
    fn test_filters() {
        let t = tables();
        let filter = SummaryFilter {
            sectors: Some(BTreeSet::from(["IT".to_string()])),
            trends: Some(BTreeSet::from([Trend::WeakBearish, Trend::Neutral])),
            top_n: 5,
        };
        let risk: Vec<&str> = filter_risk(&t.risk, &filter).iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(risk, vec!["A", "C"]);
        let signals: Vec<&str> = filter_signals(&t.signals, &filter)
            .iter()
            .map(|s| s.ticker.as_str())
            .collect();
        assert_eq!(signals, vec!["B", "C"]);
    }

    #[test]
    fn test_top_n_is_clamped() {
        let mut filter = SummaryFilter::default();
        assert_eq!(filter.top_n(), 5);
        filter.top_n = 1;
        assert_eq!(filter.top_n(), MIN_TOP_N);
        filter.top_n = 50;
        assert_eq!(filter.top_n(), MAX_TOP_N);
    }

    #[test]
    fn test_growth_leaders_use_last_defined_value() {
        let t = tables();
        let leaders = growth_leaders(&t.signals, &t.growth, 3);
        assert_eq!(leaders.len(), 3);
        assert_eq!(leaders[0].ticker, "A");
        assert_eq!(leaders[0].final_value, Some(104_000.0));
        assert_eq!(leaders[1].ticker, "D");
        assert_eq!(leaders[1].final_value, Some(99_000.0));
        assert_eq!(leaders[1].last_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(leaders[2].ticker, "B");
        assert_eq!(leaders[2].final_value, None);
    }

    #[test]
    fn test_build_summary_ignores_trend_filter_for_leaders() {
        let t = tables();
        let filter = SummaryFilter {
            trends: Some(BTreeSet::from([Trend::Neutral])),
            ..SummaryFilter::default()
        };
        let summary = build_summary(&t, &filter);
        assert_eq!(summary.signals.len(), 1);
        assert_eq!(summary.overview.neutral, 1);
        assert_eq!(summary.leaders[0].ticker, "A");

        let text = render_text(&summary);
        assert!(text.contains("Top Momentum: C (n/a)"));
        assert!(text.contains("104000"));
    }

    #[test]
    fn test_summary_carries_rounded_correlation() {
        let summary = build_summary(&tables(), &SummaryFilter::default());
        assert_eq!(summary.correlation.tickers, vec!["A", "D"]);
        assert_eq!(summary.correlation.get("A", "D"), Some(0.42));
        assert_eq!(summary.correlation.get("D", "A"), Some(0.42));
        assert_eq!(summary.correlation.get("D", "D"), None);

        let text = render_text(&summary);
        assert!(text.contains("🔗 Correlation Matrix"));
        assert!(text.contains("0.42"));
        assert!(text.contains("n/a"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["correlation"]["tickers"][1], "D");
        assert!(json["correlation"]["values"][1][1].is_null());
    }
}
