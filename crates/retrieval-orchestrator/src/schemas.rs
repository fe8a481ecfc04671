//! Response shapes requested from the formatter, one per operation.

use pulse_core::Schema;

use crate::models::NewsCategory;

/// Chart ranges every stock payload carries.
pub const CHART_RANGES: [&str; 8] = ["1D", "5D", "1M", "6M", "AA", "1A", "5A", "Todo"];

pub const KEY_STATS: [&str; 6] = [
    "Anterior Cerrar",
    "Volumen",
    "Rango de 52 semanas",
    "Abierto",
    "Rango del día",
    "Capitalización de Mercado",
];

fn strings(names: &[&str]) -> Vec<(String, Schema)> {
    names
        .iter()
        .map(|n| (n.to_string(), Schema::string()))
        .collect()
}

fn numbers(names: &[&str]) -> Vec<(String, Schema)> {
    names
        .iter()
        .map(|n| (n.to_string(), Schema::number()))
        .collect()
}

/// Object with every listed property required.
fn record(properties: Vec<(String, Schema)>) -> Schema {
    let required = properties.iter().map(|(n, _)| n.clone()).collect();
    Schema::Object {
        properties,
        required,
        description: None,
    }
}

pub fn ai_analysis() -> Schema {
    record(strings(&["patternDetected", "historicalContext", "recommendation"]))
}

pub fn backtest() -> Schema {
    record(strings(&["aiPrediction", "aiReasoning", "actualOutcome"]))
}

pub fn retirement() -> Schema {
    Schema::object(vec![(
        "analysis",
        Schema::string().describe(
            "A 3-4 sentence general, encouraging analysis of the retirement plan. No specific financial advice.",
        ),
    )])
}

pub fn sentiment() -> Schema {
    Schema::object(vec![
        (
            "overallSentiment",
            Schema::one_of(&["Positive", "Neutral", "Negative", "Mixed"]),
        ),
        ("keyTakeaways", Schema::string()),
        (
            "articles",
            Schema::array(record(strings(&["title", "summary", "source"]))),
        ),
    ])
}

fn news_item() -> Schema {
    let mut properties = strings(&["id", "headline", "summary", "source"]);
    properties.push(("category".into(), Schema::one_of(&NewsCategory::labels())));
    properties.push((
        "imageUrlPrompt".into(),
        Schema::string().describe("A 2-3 word prompt for an illustrative image"),
    ));
    record(properties)
}

pub fn financial_news() -> Schema {
    Schema::object(vec![(
        "news",
        Schema::array(news_item()).describe("List of 10 financial news articles."),
    )])
}

fn market_index() -> Schema {
    let mut properties = strings(&["name", "ticker"]);
    properties.extend(numbers(&["value", "change", "changePercent"]));
    record(properties)
}

pub fn market_indices() -> Schema {
    Schema::object(vec![("indices", Schema::array(market_index()))])
}

pub fn watchlist_prices() -> Schema {
    let mut properties = strings(&["ticker"]);
    properties.extend(numbers(&["price", "change", "changePercent"]));
    Schema::object(vec![("prices", Schema::array(record(properties)))])
}

pub fn dashboard() -> Schema {
    let mut alert = strings(&["ticker", "action", "executive", "value", "time"]);
    alert.push(("risk".into(), Schema::one_of(&["CRITICAL", "HIGH", "MEDIUM"])));

    Schema::object(vec![
        ("liveAlerts", Schema::array(record(alert))),
        ("marketIndices", Schema::array(market_index())),
        ("news", Schema::array(news_item())),
    ])
}

pub fn videos() -> Schema {
    Schema::object(vec![(
        "videos",
        Schema::array(Schema::object(vec![
            ("id", Schema::string()),
            ("title", Schema::string()),
            ("channel", Schema::string().describe("Name of the YouTube channel or source.")),
            ("summary", Schema::string().describe("A one-sentence summary.")),
            ("videoId", Schema::string().describe("The YouTube video ID.")),
            ("publishedTime", Schema::string().describe("e.g. '3 days ago'")),
            ("imageUrlPrompt", Schema::string().describe("A 2-3 word prompt for an illustrative image.")),
        ]))
        .describe("List of 6-8 financial videos."),
    )])
}

pub fn live_events() -> Schema {
    let event = Schema::object(vec![
        ("id", Schema::string()),
        ("title", Schema::string()),
        ("description", Schema::string()),
        ("source", Schema::string()),
        ("isLive", Schema::boolean()),
        ("time", Schema::string().describe("Optional time, e.g. '14:30 EDT'")),
    ])
    .optional(&["time"]);

    Schema::object(vec![(
        "eventCategories",
        Schema::array(Schema::object(vec![
            ("categoryTitle", Schema::string()),
            ("events", Schema::array(event)),
        ])),
    )])
}

pub fn stock_data() -> Schema {
    let mut point = strings(&["time"]);
    point.extend(numbers(&["price", "volume"]));
    let chart_point = record(point);
    let chart_data = record(
        CHART_RANGES
            .iter()
            .map(|r| (r.to_string(), Schema::array(chart_point.clone())))
            .collect(),
    );

    let option_contract = record(numbers(&[
        "strike",
        "lastPrice",
        "bid",
        "ask",
        "change",
        "percentChange",
        "volume",
        "openInterest",
    ]));

    let mut component = strings(&["name", "symbol"]);
    component.push(("weight".into(), Schema::number().describe("Weight in percentage")));

    let mut historical = strings(&["date"]);
    historical.extend(numbers(&["open", "high", "low", "close", "volume"]));

    let mut header = strings(&["name", "ticker"]);
    header.extend(numbers(&["price", "change", "changePercent"]));
    header.extend([
        ("keyStats".to_string(), record(strings(&KEY_STATS))),
        ("chartData".to_string(), chart_data),
        (
            "news".to_string(),
            Schema::array(record(strings(&["id", "source", "time", "headline", "summary"]))),
        ),
        (
            "conversations".to_string(),
            Schema::array(Schema::object(vec![
                ("id", Schema::string()),
                ("user", Schema::string()),
                ("time", Schema::string()),
                ("post", Schema::string()),
                ("sentiment", Schema::one_of(&["Bullish", "Bearish"])),
            ]))
            .describe("Recent conversation posts about the asset. Can be empty."),
        ),
        (
            "options".to_string(),
            Schema::object(vec![
                ("calls", Schema::array(option_contract.clone())),
                ("puts", Schema::array(option_contract)),
            ])
            .describe("Option contracts, empty arrays if not applicable."),
        ),
        (
            "components".to_string(),
            Schema::array(record(component))
                .describe("Top components for an index, empty for a single stock."),
        ),
        (
            "historicalData".to_string(),
            Schema::array(record(historical)).describe("Recent daily rows. Can be empty."),
        ),
    ]);
    record(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stock_schema_requires_all_sections() {
        let rendered = stock_data().to_json();
        let required = rendered["required"].as_array().unwrap();
        for field in ["keyStats", "chartData", "news", "options", "historicalData"] {
            assert!(required.contains(&json!(field)), "{} not required", field);
        }
        assert_eq!(
            rendered["properties"]["chartData"]["required"].as_array().unwrap().len(),
            CHART_RANGES.len()
        );
    }

    #[test]
    fn test_news_schema_lists_spanish_categories() {
        let rendered = financial_news().to_json();
        let category = &rendered["properties"]["news"]["items"]["properties"]["category"];
        assert_eq!(category["enum"].as_array().unwrap().len(), 6);
        assert!(category["enum"].as_array().unwrap().contains(&json!("Economía")));
    }

    #[test]
    fn test_live_event_time_is_optional() {
        let value = json!({ "eventCategories": [ { "categoryTitle": "Hoy", "events": [
            { "id": "1", "title": "CPI", "description": "d", "source": "BLS", "isLive": false }
        ] } ] });
        assert!(live_events().validate(&value).is_ok());
    }
}
