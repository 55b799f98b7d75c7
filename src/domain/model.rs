use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One trading session of one ticker, as read from the raw price table.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub sector: String,
    /// `None` when the source cell was empty or `NaN`.
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Sector")]
    pub sector: String,
    #[serde(rename = "Volatility_Annual_Pct")]
    pub volatility_annual_pct: Option<f64>,
    #[serde(rename = "Return_Annual_Pct")]
    pub return_annual_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
    #[serde(rename = "MA50")]
    pub ma50: Option<f64>,
    #[serde(rename = "MA_Diff_Pct")]
    pub ma_diff_pct: Option<f64>,
    #[serde(rename = "Trend")]
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthRecord {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Investment_Value_Numeric")]
    pub investment_value: Option<f64>,
}

/// Square matrix of pairwise return correlations, same ticker order on both axes.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CorrelationMatrix {
    pub tickers: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == row)?;
        let j = self.tickers.iter().position(|t| t == col)?;
        self.values[i][j]
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Trend {
    StrongBullish,
    WeakBullish,
    StrongBearish,
    WeakBearish,
    Neutral,
}

impl Trend {
    pub const ALL: [Trend; 5] = [
        Trend::StrongBullish,
        Trend::WeakBullish,
        Trend::StrongBearish,
        Trend::WeakBearish,
        Trend::Neutral,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Trend::StrongBullish => "Strong Bullish",
            Trend::WeakBullish => "Weak Bullish",
            Trend::StrongBearish => "Strong Bearish",
            Trend::WeakBearish => "Weak Bearish",
            Trend::Neutral => "Neutral",
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, Trend::StrongBullish | Trend::WeakBullish)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, Trend::StrongBearish | Trend::WeakBearish)
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Trend {
    type Err = String;

    // Older output files decorate labels with an emoji suffix ("Strong Bullish 🚀").
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Trend::ALL
            .into_iter()
            .find(|t| {
                s.strip_prefix(t.label())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
            })
            .ok_or_else(|| format!("Unknown trend label: {}", s))
    }
}

impl TryFrom<String> for Trend {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Trend> for String {
    fn from(value: Trend) -> Self {
        value.label().to_string()
    }
}

/// The four derived tables produced by one pipeline run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisResult {
    pub risk: Vec<RiskRecord>,
    pub signals: Vec<SignalRecord>,
    pub growth: Vec<GrowthRecord>,
    pub correlation: CorrelationMatrix,
}

/// Constants of the analysis. Defaults match the daily-data conventions the
/// dashboard expects (252 sessions a year, MA50, a 100,000 stake).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub ma_window: usize,
    pub trading_days: u32,
    pub initial_investment: f64,
    pub strong_threshold: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            ma_window: 50,
            trading_days: 252,
            initial_investment: 100_000.0,
            strong_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFiles {
    pub risk: String,
    pub signals: String,
    pub growth: String,
    pub correlation: String,
}

impl Default for OutputFiles {
    fn default() -> Self {
        Self {
            risk: "stock_risk.csv".to_string(),
            signals: "stock_signals.csv".to_string(),
            growth: "stock_growth.csv".to_string(),
            correlation: "stock_correlation.csv".to_string(),
        }
    }
}

impl OutputFiles {
    pub fn all(&self) -> [&str; 4] {
        [&self.risk, &self.signals, &self.growth, &self.correlation]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_label_round_trip_with_decoration() {
        assert_eq!("Strong Bullish".parse::<Trend>().unwrap(), Trend::StrongBullish);
        assert_eq!("Weak Bearish ↘️".parse::<Trend>().unwrap(), Trend::WeakBearish);
        assert_eq!(" Neutral ".parse::<Trend>().unwrap(), Trend::Neutral);
        assert!("Sideways".parse::<Trend>().is_err());
        assert!("Strong Bullishness".parse::<Trend>().is_err());
    }

    #[test]
    fn test_trend_direction() {
        assert!(Trend::WeakBullish.is_bullish());
        assert!(Trend::StrongBearish.is_bearish());
        assert!(!Trend::Neutral.is_bullish() && !Trend::Neutral.is_bearish());
    }

    #[test]
    fn test_correlation_lookup() {
        let matrix = CorrelationMatrix {
            tickers: vec!["A".to_string(), "B".to_string()],
            values: vec![vec![Some(1.0), Some(0.5)], vec![Some(0.5), Some(1.0)]],
        };
        assert_eq!(matrix.get("A", "B"), Some(0.5));
        assert_eq!(matrix.get("A", "C"), None);
        assert_eq!(matrix.len(), 2);
    }
}
