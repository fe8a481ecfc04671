//! Market content returned to API callers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The five AI risk-analysis modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisType {
    #[serde(rename = "Insider Trading")]
    InsiderTrading,
    #[serde(rename = "Accounting Red Flags")]
    AccountingFlags,
    #[serde(rename = "Supply Chain Risks")]
    SupplyChain,
    #[serde(rename = "Patent Analysis")]
    Patents,
    #[serde(rename = "Regulatory Risks")]
    RegulatoryRisks,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        AnalysisType::InsiderTrading,
        AnalysisType::AccountingFlags,
        AnalysisType::SupplyChain,
        AnalysisType::Patents,
        AnalysisType::RegulatoryRisks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::InsiderTrading => "Insider Trading",
            AnalysisType::AccountingFlags => "Accounting Red Flags",
            AnalysisType::SupplyChain => "Supply Chain Risks",
            AnalysisType::Patents => "Patent Analysis",
            AnalysisType::RegulatoryRisks => "Regulatory Risks",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NewsCategory {
    Mercados,
    #[serde(rename = "Tecnología")]
    Tecnologia,
    #[serde(rename = "Economía")]
    Economia,
    Cripto,
    #[serde(rename = "Opinión")]
    Opinion,
    Global,
}

impl NewsCategory {
    pub const ALL: [NewsCategory; 6] = [
        NewsCategory::Mercados,
        NewsCategory::Tecnologia,
        NewsCategory::Economia,
        NewsCategory::Cripto,
        NewsCategory::Opinion,
        NewsCategory::Global,
    ];

    /// Query value meaning "every category".
    pub const ALL_LABEL: &'static str = "Todo";

    pub fn as_str(&self) -> &'static str {
        match self {
            NewsCategory::Mercados => "Mercados",
            NewsCategory::Tecnologia => "Tecnología",
            NewsCategory::Economia => "Economía",
            NewsCategory::Cripto => "Cripto",
            NewsCategory::Opinion => "Opinión",
            NewsCategory::Global => "Global",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }
}

impl FromStr for NewsCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Unknown news category: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    US,
    Europe,
    Asia,
    Cryptos,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::US => "US",
            Region::Europe => "Europe",
            Region::Asia => "Asia",
            Region::Cryptos => "Cryptos",
        }
    }

    /// Instruments searched for in this region.
    pub fn instruments(&self) -> &'static str {
        match self {
            Region::US => "S&P 500, Dow 30, Nasdaq, Russell 2k, VIX",
            Region::Europe => "FTSE 100, DAX, CAC 40",
            Region::Asia => "Nikkei 225, Hang Seng, Shanghai Composite",
            Region::Cryptos => "Bitcoin, Ethereum, Solana, XRP",
        }
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "US" => Ok(Region::US),
            "Europe" => Ok(Region::Europe),
            "Asia" => Ok(Region::Asia),
            "Cryptos" => Ok(Region::Cryptos),
            other => Err(format!("Unknown region: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallSentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertRisk {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostSentiment {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub ticker: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysisResult {
    pub pattern_detected: String,
    pub historical_context: String,
    pub recommendation: String,
}

impl AiAnalysisResult {
    pub fn unavailable(analysis_type: AnalysisType) -> Self {
        Self {
            pattern_detected: format!("AI analysis for {} could not be completed.", analysis_type),
            historical_context: "The AI service could not be reached. Analysis is unavailable."
                .to_string(),
            recommendation: "Unable to provide a recommendation at this time.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub uri: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysisResult {
    pub overall_sentiment: OverallSentiment,
    pub key_takeaways: String,
    pub articles: Vec<NewsArticle>,
}

impl SentimentAnalysisResult {
    pub fn unavailable() -> Self {
        Self {
            overall_sentiment: OverallSentiment::Neutral,
            key_takeaways: "Could not fetch real-time news. Sentiment analysis is unavailable."
                .to_string(),
            articles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialNewsArticle {
    pub id: String,
    pub headline: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub image_url: String,
    pub category: NewsCategory,
}

/// News item as produced by the formatter, before the image link is derived.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FormattedNewsArticle {
    pub id: String,
    pub headline: String,
    pub summary: String,
    pub source: String,
    pub category: NewsCategory,
    pub image_url_prompt: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketIndex {
    pub name: String,
    pub ticker: String,
    pub value: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub time: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockNewsArticle {
    pub id: String,
    pub source: String,
    pub time: String,
    pub headline: String,
    pub summary: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationPost {
    pub id: String,
    pub user: String,
    pub time: String,
    pub post: String,
    pub sentiment: PostSentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    pub strike: f64,
    pub last_price: f64,
    pub bid: f64,
    pub ask: f64,
    pub change: f64,
    pub percent_change: f64,
    pub volume: f64,
    pub open_interest: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub calls: Vec<OptionContract>,
    pub puts: Vec<OptionContract>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexComponent {
    pub name: String,
    pub symbol: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDataRow {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockData {
    pub name: String,
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    /// Keyed by range label (`1D`, `5D`, ... `Todo`).
    pub chart_data: BTreeMap<String, Vec<ChartDataPoint>>,
    pub key_stats: BTreeMap<String, String>,
    pub news: Vec<StockNewsArticle>,
    pub conversations: Vec<ConversationPost>,
    pub options: OptionChain,
    pub components: Vec<IndexComponent>,
    pub historical_data: Vec<HistoricalDataRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialVideo {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub summary: String,
    pub video_id: String,
    pub published_time: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FormattedVideo {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub summary: String,
    pub video_id: String,
    pub published_time: String,
    pub image_url_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub source: String,
    #[serde(default)]
    pub url: String,
    pub is_live: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEventCategory {
    pub category_title: String,
    pub events: Vec<LiveEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistPriceData {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveAlert {
    pub ticker: String,
    pub action: String,
    pub executive: String,
    pub value: String,
    pub time: String,
    pub risk: AlertRisk,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub live_alerts: Vec<LiveAlert>,
    pub market_indices: Vec<MarketIndex>,
    pub news: Vec<FinancialNewsArticle>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FormattedDashboard {
    pub live_alerts: Vec<LiveAlert>,
    pub market_indices: Vec<MarketIndex>,
    pub news: Vec<FormattedNewsArticle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestScenario {
    pub id: String,
    pub ticker: String,
    pub company_name: String,
    pub event_description: String,
    pub event_date: String,
    pub pre_event_data_summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub ai_prediction: String,
    pub ai_reasoning: String,
    pub actual_outcome: String,
}

impl BacktestResult {
    pub fn failed() -> Self {
        Self {
            ai_prediction: "Error: AI Backtest Failed".to_string(),
            ai_reasoning: "Could not generate a prediction because the AI service is unavailable."
                .to_string(),
            actual_outcome: "Analysis could not be completed.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementInputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub monthly_contribution: f64,
    pub final_amount: f64,
}

pub const RETIREMENT_UNAVAILABLE: &str = "AI analysis is currently unavailable.";
