use pulse_core::{CitationTarget, RetrievalRequest, RetrievalResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::*;
use crate::orchestrator::RetrievalOrchestrator;
use crate::{prompts, schemas};

// Cache lifetimes in seconds, shorter for fast-moving prices
const STOCK_TTL: u64 = 180;
const WATCHLIST_TTL: u64 = 120;
const INDICES_TTL: u64 = 300;
const ANALYSIS_TTL: u64 = 600;
const SENTIMENT_TTL: u64 = 300;
const NEWS_TTL: u64 = 300;
const DASHBOARD_TTL: u64 = 300;
const VIDEOS_TTL: u64 = 1800;
const EVENTS_TTL: u64 = 180;
const BACKTEST_TTL: u64 = 3600;
const RETIREMENT_TTL: u64 = 3600;

const IMAGE_BASE_URL: &str = "https://source.unsplash.com/800x600/";

/// Illustrative image link for a short prompt.
pub fn image_url(prompt: &str) -> String {
    format!("{}?{}", IMAGE_BASE_URL, urlencoding::encode(prompt))
}

#[derive(Deserialize)]
struct NewsPayload {
    news: Vec<FormattedNewsArticle>,
}

#[derive(Deserialize)]
struct PricesPayload {
    prices: Vec<WatchlistPriceData>,
}

#[derive(Deserialize)]
struct IndicesPayload {
    indices: Vec<MarketIndex>,
}

#[derive(Deserialize)]
struct VideosPayload {
    videos: Vec<FormattedVideo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPayload {
    event_categories: Vec<LiveEventCategory>,
}

#[derive(Deserialize)]
struct RetirementPayload {
    analysis: String,
}

/// Market content operations. Each maps to one retrieval with a fixed
/// operation name and cache lifetime; `None` or an empty list means the
/// provider could not deliver and the caller shows its own fallback.
#[derive(Clone)]
pub struct MarketInsights {
    orchestrator: RetrievalOrchestrator,
}

impl MarketInsights {
    pub fn new(orchestrator: RetrievalOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &RetrievalOrchestrator {
        &self.orchestrator
    }

    pub async fn stock_data(&self, ticker: &str) -> Option<StockData> {
        let request = RetrievalRequest::new("stock", schemas::stock_data())
            .param("ticker", ticker)
            .ttl(STOCK_TTL)
            .search_prompt(prompts::stock_search(ticker))
            .format_instruction(prompts::stock_format(ticker))
            .cite(CitationTarget::by_label("news", "headline", "url"));

        let result = self.orchestrator.fetch(&request).await;
        self.decode(&request, &result)
    }

    /// Prices for a set of tickers. Order and case of the input do not matter.
    pub async fn watchlist_prices(&self, tickers: &[String]) -> Vec<WatchlistPriceData> {
        let mut normalized: Vec<String> = tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();
        if normalized.is_empty() {
            return Vec::new();
        }

        let request = RetrievalRequest::new("watchlist", schemas::watchlist_prices())
            .param("tickers", normalized.join(","))
            .ttl(WATCHLIST_TTL)
            .search_prompt(prompts::watchlist_search(&normalized))
            .format_instruction(prompts::FORMAT_LIST);

        let result = self.orchestrator.fetch(&request).await;
        self.decode::<PricesPayload>(&request, &result)
            .map(|p| p.prices)
            .unwrap_or_default()
    }

    pub async fn market_indices(&self, region: Region) -> Vec<MarketIndex> {
        let request = RetrievalRequest::new("indices", schemas::market_indices())
            .param("region", region.as_str())
            .ttl(INDICES_TTL)
            .search_prompt(prompts::indices_search(region))
            .format_instruction(prompts::FORMAT_LIST);

        let result = self.orchestrator.fetch(&request).await;
        self.decode::<IndicesPayload>(&request, &result)
            .map(|p| p.indices)
            .unwrap_or_default()
    }

    pub async fn ai_analysis(
        &self,
        company: &CompanyProfile,
        analysis_type: AnalysisType,
    ) -> Option<AiAnalysisResult> {
        let request = RetrievalRequest::new("analysis", schemas::ai_analysis())
            .param("ticker", company.ticker.as_str())
            .param("type", analysis_type.as_str())
            .ttl(ANALYSIS_TTL)
            .search_prompt(prompts::analysis_search(company, analysis_type))
            .format_instruction(prompts::ANALYSIS_FORMAT);

        let result = self.orchestrator.fetch(&request).await;
        self.decode(&request, &result)
    }

    pub async fn sentiment(&self, company: &CompanyProfile) -> Option<SentimentAnalysisResult> {
        let request = RetrievalRequest::new("sentiment", schemas::sentiment())
            .param("ticker", company.ticker.as_str())
            .ttl(SENTIMENT_TTL)
            .search_prompt(prompts::sentiment_search(company))
            .format_instruction(prompts::FORMAT_LIST)
            .cite(CitationTarget::by_label("articles", "title", "uri"));

        let result = self.orchestrator.fetch(&request).await;
        self.decode(&request, &result)
    }

    /// Top stories, optionally restricted to one category.
    pub async fn financial_news(&self, category: Option<NewsCategory>) -> Vec<FinancialNewsArticle> {
        let label = category.map_or(NewsCategory::ALL_LABEL, |c| c.as_str());
        let request = RetrievalRequest::new("news", schemas::financial_news())
            .param("category", label)
            .ttl(NEWS_TTL)
            .search_prompt(prompts::news_search(category))
            .format_instruction(prompts::FORMAT_LIST)
            .cite(CitationTarget::by_label("news", "headline", "url"));

        let result = self.orchestrator.fetch(&request).await;
        self.decode::<NewsPayload>(&request, &result)
            .map(|p| p.news.into_iter().map(finish_article).collect())
            .unwrap_or_default()
    }

    /// Alerts, US indices and top news in one retrieval.
    pub async fn dashboard(&self) -> Option<DashboardData> {
        let request = RetrievalRequest::new("dashboard", schemas::dashboard())
            .param("view", "initial")
            .ttl(DASHBOARD_TTL)
            .search_prompt(prompts::DASHBOARD_SEARCH)
            .format_instruction(prompts::DASHBOARD_FORMAT)
            .cite(CitationTarget::by_label("news", "headline", "url"));

        let result = self.orchestrator.fetch(&request).await;
        self.decode::<FormattedDashboard>(&request, &result)
            .map(|d| DashboardData {
                live_alerts: d.live_alerts,
                market_indices: d.market_indices,
                news: d.news.into_iter().map(finish_article).collect(),
            })
    }

    pub async fn videos(&self) -> Vec<FinancialVideo> {
        let request = RetrievalRequest::new("videos", schemas::videos())
            .param("feed", "financial")
            .ttl(VIDEOS_TTL)
            .search_prompt(prompts::VIDEOS_SEARCH)
            .format_instruction(prompts::FORMAT_LIST);

        let result = self.orchestrator.fetch(&request).await;
        self.decode::<VideosPayload>(&request, &result)
            .map(|p| {
                p.videos
                    .into_iter()
                    .map(|v| FinancialVideo {
                        image_url: image_url(&v.image_url_prompt),
                        id: v.id,
                        title: v.title,
                        channel: v.channel,
                        summary: v.summary,
                        video_id: v.video_id,
                        published_time: v.published_time,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Live events by category. Sources are handed out in order across all
    /// categories, so there is no label matching here.
    pub async fn live_events(&self) -> Vec<LiveEventCategory> {
        let request = RetrievalRequest::new("events", schemas::live_events())
            .param("feed", "live")
            .ttl(EVENTS_TTL)
            .search_prompt(prompts::EVENTS_SEARCH)
            .format_instruction(prompts::FORMAT_LIST)
            .cite(CitationTarget::positional("eventCategories.events", "url"));

        let result = self.orchestrator.fetch(&request).await;
        self.decode::<EventsPayload>(&request, &result)
            .map(|p| p.event_categories)
            .unwrap_or_default()
    }

    pub async fn backtest(&self, scenario: &BacktestScenario) -> Option<BacktestResult> {
        let request = RetrievalRequest::new("backtest", schemas::backtest())
            .param("scenarioId", scenario.id.as_str())
            .ttl(BACKTEST_TTL)
            .format_instruction(prompts::backtest_prompt(scenario));

        let result = self.orchestrator.fetch_structured(&request).await;
        self.decode(&request, &result)
    }

    pub async fn retirement(&self, inputs: &RetirementInputs) -> Option<String> {
        let request = RetrievalRequest::new("retirement", schemas::retirement())
            .param("currentAge", inputs.current_age.to_string())
            .param("retirementAge", inputs.retirement_age.to_string())
            .param("monthlyContribution", inputs.monthly_contribution.to_string())
            .param("finalAmount", inputs.final_amount.to_string())
            .ttl(RETIREMENT_TTL)
            .format_instruction(prompts::retirement_prompt(inputs));

        let result = self.orchestrator.fetch_structured(&request).await;
        self.decode::<RetirementPayload>(&request, &result)
            .map(|p| p.analysis)
            .filter(|a| !a.trim().is_empty())
    }

    /// Typed view of a result. A cached payload that passed the schema but
    /// does not fit the model is evicted so the next call starts clean.
    fn decode<T: DeserializeOwned>(
        &self,
        request: &RetrievalRequest,
        result: &RetrievalResult,
    ) -> Option<T> {
        match result.decode::<T>() {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(
                    operation = %request.operation,
                    "Formatted payload does not fit the model: {}",
                    e
                );
                self.orchestrator
                    .cache()
                    .delete(&RetrievalOrchestrator::cache_key(request));
                None
            }
        }
    }
}

fn finish_article(article: FormattedNewsArticle) -> FinancialNewsArticle {
    FinancialNewsArticle {
        image_url: image_url(&article.image_url_prompt),
        id: article.id,
        headline: article.headline,
        summary: article.summary,
        source: article.source,
        url: article.url,
        category: article.category,
    }
}
