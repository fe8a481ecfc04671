//! Prompt text for each operation.

use crate::models::{AnalysisType, BacktestScenario, CompanyProfile, NewsCategory, Region, RetirementInputs};
use crate::schemas::{CHART_RANGES, KEY_STATS};

pub const FORMAT_LIST: &str =
    "Based on the provided text, format the data into a JSON object that follows the schema.";

pub fn stock_search(ticker: &str) -> String {
    format!(
        "You are a financial data API. Use Google Search to get comprehensive, current data for the asset with ticker {ticker}. \
         It may be a stock (AAPL) or a market index (^SPX, ^DJI).\n\
         Report as clear text, stating plainly when something is not available or not applicable:\n\
         - the asset's name, current price, change and percent change\n\
         - key statistics: {stats}\n\
         - plausible price and volume history for the ranges {ranges}; '1D' uses times, the others dates\n\
         - 2-3 recent news articles with id, source, time, headline and summary\n\
         - a few sample conversation posts labelled Bullish or Bearish\n\
         - a few near-term call and put option contracts\n\
         - recent daily rows (date, open, high, low, close, volume)\n\
         - for an index, its top 5-10 components by weight; for a stock, none",
        ticker = ticker,
        stats = KEY_STATS.join(", "),
        ranges = CHART_RANGES.join(", "),
    )
}

pub fn stock_format(ticker: &str) -> String {
    format!(
        "Based on the following financial data for {}, generate a complete JSON object that strictly follows the schema. \
         When a section does not apply, return an empty array or object for it. Do not omit any field.",
        ticker
    )
}

pub fn watchlist_search(tickers: &[String]) -> String {
    format!(
        "Using Google Search, get the current price, absolute change and percent change for these tickers: {}. \
         Present a clear text list.",
        tickers.join(", ")
    )
}

pub fn indices_search(region: Region) -> String {
    format!(
        "Using Google Search, get current market data for the main indices in the {} region ({}). \
         Give the name, ticker, value, change and percent change of each as a text list.",
        region.as_str(),
        region.instruments()
    )
}

pub fn analysis_search(company: &CompanyProfile, analysis_type: AnalysisType) -> String {
    let focus = match analysis_type {
        AnalysisType::InsiderTrading => {
            "Analyze recent insider trading activity: timing relative to earnings reports, the \
             executives' positions, share volume and value, and coordination among executives. \
             If nothing looks suspicious, explain why the activity appears routine."
        }
        AnalysisType::AccountingFlags => {
            "Look for accounting red flags: revenue manipulation, unusual inventory levels, \
             changes in accounting policy, and gaps between cash flow and net income."
        }
        AnalysisType::SupplyChain => {
            "Assess supply chain risk: key supplier dependencies, geopolitical exposure in \
             sourcing, logistics weak points and inventory strategy."
        }
        AnalysisType::Patents => {
            "Review the patent portfolio: key patents, their weight in revenue, expiration dates, \
             and the risk from expirations or litigation."
        }
        AnalysisType::RegulatoryRisks => {
            "Assess regulatory exposure: antitrust actions, data privacy rules, environmental \
             compliance and industry-specific regulation, with likely financial impact."
        }
    };

    format!(
        "You are a financial analyst. Write a detailed analysis of {} ({}) using the latest information. \
         Topic: {}. {} If the risk is low, say which positive indicators you see and why they are positive.",
        company.name, company.ticker, analysis_type, focus
    )
}

pub const ANALYSIS_FORMAT: &str = "Based on the provided analysis, extract the pattern detected, \
     the historical context and the final recommendation into the fields of the schema.";

pub fn sentiment_search(company: &CompanyProfile) -> String {
    format!(
        "You are a financial news analyst. Use Google Search to find the most relevant news about {} ({}) \
         from the past 7-10 days: earnings, launches, executive changes, regulation, M&A. \
         Ignore price target changes not tied to new fundamentals. \
         Summarize the overall sentiment and key takeaways, then list each article with title, summary and source.",
        company.name, company.ticker
    )
}

pub fn news_search(category: Option<NewsCategory>) -> String {
    let scope = match category {
        Some(category) => format!("in the '{}' category", category.as_str()),
        None => format!("with a mix of the categories {}", NewsCategory::labels().join(", ")),
    };
    format!(
        "You are a financial news editor. Use Google Search to find the 10 most important financial news stories right now {}. \
         For each give an id, headline, summary, source, category (one of {}) and a 2-3 word image prompt. \
         Lead with the most significant story. Present a clear text list.",
        scope,
        NewsCategory::labels().join(", ")
    )
}

pub const DASHBOARD_SEARCH: &str = "You are a financial dashboard API. Use Google Search to gather, in one pass: \
     1. five recent significant insider trading events; \
     2. current data for the main US indices (S&P 500, Dow 30, Nasdaq, Russell 2k, VIX); \
     3. the 10 most important financial news stories across all categories, each with an image prompt. \
     Present everything as a structured text block.";

pub const DASHBOARD_FORMAT: &str = "Based on the provided text, generate one complete JSON object that \
     follows the schema, with lists for liveAlerts, marketIndices and news.";

pub const VIDEOS_SEARCH: &str = "You are a financial content curator. Use Google Search to find 8 popular, \
     recent financial analysis videos on YouTube covering markets, stock reviews and economic news. \
     For each give id, title, channel, summary, YouTube videoId, published time and an image prompt. \
     Present a clear text list.";

pub const EVENTS_SEARCH: &str = "You are a live market intelligence service. Use Google Search for current market activity in three categories: \
     'Transmisiones en Vivo' (live streams from major outlets such as press conferences), \
     'Calendario Económico (Hoy)' (today's economic releases and results), \
     'Noticias de Última Hora' (2-3 market-moving headlines from the last hours). \
     For each event give id, title, description, source, whether it is live, and an optional time.";

pub fn backtest_prompt(scenario: &BacktestScenario) -> String {
    format!(
        "You are performing a historical backtest as of {date}. Use ONLY the pre-event data below; \
         do not use knowledge of what happened afterwards.\n\
         Company: {name} ({ticker})\n\
         Event to predict: {event}\n\
         Pre-event data:\n{summary}\n\
         Predict the likely outcome and answer with JSON that follows the schema.",
        date = scenario.event_date,
        name = scenario.company_name,
        ticker = scenario.ticker,
        event = scenario.event_description,
        summary = scenario.pre_event_data_summary,
    )
}

pub fn retirement_prompt(inputs: &RetirementInputs) -> String {
    format!(
        "A user is planning for retirement:\n\
         - current age: {}\n\
         - retirement age: {}\n\
         - monthly contribution: ${:.2}\n\
         - estimated final savings: ${:.0}\n\
         Give a short, encouraging, general analysis in 3-4 sentences about compounding, consistent \
         contributions and a long-term view. Do not give specific financial advice. Answer with JSON \
         that follows the schema.",
        inputs.current_age, inputs.retirement_age, inputs.monthly_contribution, inputs.final_amount
    )
}
