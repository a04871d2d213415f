//! HTML rendering of a report
//!
//! Query rows are flattened into pre-formatted view models so the template
//! holds no formatting logic. Queries that returned no rows are left out;
//! failed queries render an error placeholder in their place.

use crate::analytics::{QueryResult, ReportResults};
use askama::Template;
use chrono::{DateTime, Utc};
use num_format::{Locale, ToFormattedString};

pub struct Metric {
    pub label: &'static str,
    pub value: String,
}

pub struct Section {
    pub title: &'static str,
    pub has_error: bool,
    pub error: String,
    pub metrics: Vec<Metric>,
    pub facts: Vec<Metric>,
    pub note: String,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Section {
    fn new(title: &'static str) -> Self {
        Self {
            title,
            has_error: false,
            error: String::new(),
            metrics: Vec::new(),
            facts: Vec::new(),
            note: String::new(),
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn failed(title: &'static str, error: &str) -> Self {
        Self {
            has_error: true,
            error: error.to_string(),
            ..Self::new(title)
        }
    }
}

#[derive(Template)]
#[template(path = "report.html")]
pub struct ReportTemplate {
    pub generated: String,
    pub sections: Vec<Section>,
}

/// Render the full HTML document
pub fn render_report(
    results: &ReportResults,
    generated_at: DateTime<Utc>,
) -> Result<String, askama::Error> {
    ReportTemplate {
        generated: generated_at.format("%B %d, %Y at %H:%M UTC").to_string(),
        sections: build_sections(results),
    }
    .render()
}

/// Sections in display order
pub fn build_sections(results: &ReportResults) -> Vec<Section> {
    [
        summary_section(&results.summary_stats),
        table_section(
            "📈 Monthly Trends",
            vec!["Month", "Listings", "Avg Price", "Avg Price/SqFt"],
            &results.monthly_trends,
            |r| {
                vec![
                    format!("{} {}", r.month_name, r.year),
                    format_int(r.listing_count),
                    money(r.avg_price),
                    money_cents(r.avg_price_per_sqft),
                ]
            },
        ),
        table_section(
            "📍 Location Performance",
            vec![
                "City",
                "Listings",
                "Avg Price",
                "Avg Bedrooms",
                "Avg SqFt",
                "Avg Price/SqFt",
            ],
            &results.location_analysis,
            |r| {
                vec![
                    r.city.clone(),
                    format_int(r.listing_count),
                    money(r.avg_price),
                    format!("{:.1}", r.avg_bedrooms),
                    format_number(r.avg_sqft, 0),
                    money_cents(r.avg_price_per_sqft),
                ]
            },
        ),
        table_section(
            "🏘️ Property Type Distribution",
            vec!["Type", "Listings", "% of Total", "Avg Price", "Avg Bedrooms"],
            &results.property_type_distribution,
            |r| {
                vec![
                    r.type_name.clone(),
                    format_int(r.listing_count),
                    format!("{:.1}%", r.pct_of_total),
                    money(r.avg_price),
                    format!("{:.1}", r.avg_bedrooms),
                ]
            },
        ),
        correlation_section(&results.price_correlations),
        table_section(
            "💎 Top 10 Most Expensive Listings",
            vec!["ID", "City", "Type", "Bedrooms", "SqFt", "Price", "Price/SqFt"],
            &results.top_10_expensive,
            |r| {
                vec![
                    r.listing_id.to_string(),
                    r.city.clone(),
                    r.type_name.clone(),
                    r.bedrooms.to_string(),
                    format_number(r.sqft, 0),
                    money(r.price),
                    money_cents(r.price_per_sqft),
                ]
            },
        ),
        table_section(
            "💰 Market Segmentation by Price",
            vec!["Price Bracket", "Listings", "% of Total", "Avg Price"],
            &results.price_brackets,
            |r| {
                vec![
                    r.price_bracket.clone(),
                    format_int(r.listing_count),
                    format!("{:.1}%", r.pct_of_total),
                    money(r.avg_price),
                ]
            },
        ),
        table_section(
            "🛏️ Inventory by Bedroom Count",
            vec!["Bedrooms", "Listings", "Avg Price", "Avg SqFt"],
            &results.bedroom_distribution,
            |r| {
                vec![
                    bedroom_label(r.bedrooms),
                    format_int(r.listing_count),
                    money(r.avg_price),
                    format_number(r.avg_sqft, 0),
                ]
            },
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn table_section<T>(
    title: &'static str,
    headers: Vec<&'static str>,
    result: &QueryResult<T>,
    row: impl Fn(&T) -> Vec<String>,
) -> Option<Section> {
    match result {
        QueryResult::Failed { error } => Some(Section::failed(title, error)),
        QueryResult::Rows(rows) if rows.is_empty() => None,
        QueryResult::Rows(rows) => Some(Section {
            headers,
            rows: rows.iter().map(row).collect(),
            ..Section::new(title)
        }),
    }
}

fn summary_section(result: &QueryResult<super::SummaryStats>) -> Option<Section> {
    const TITLE: &str = "📊 Summary Statistics";
    let stats = match result {
        QueryResult::Failed { error } => return Some(Section::failed(TITLE, error)),
        QueryResult::Rows(rows) => rows.first()?,
    };

    Some(Section {
        metrics: vec![
            Metric {
                label: "Total Listings",
                value: format_int(stats.total_listings),
            },
            Metric {
                label: "Average Price",
                value: or_na(stats.avg_price, money),
            },
            Metric {
                label: "Avg Price/SqFt",
                value: or_na(stats.avg_price_per_sqft, money_cents),
            },
            Metric {
                label: "Avg Square Feet",
                value: or_na(stats.avg_sqft, |v| format_number(v, 0)),
            },
            Metric {
                label: "Avg Bedrooms",
                value: or_na(stats.avg_bedrooms, |v| format_number(v, 1)),
            },
        ],
        ..Section::new(TITLE)
    })
}

fn correlation_section(result: &QueryResult<super::PriceCorrelations>) -> Option<Section> {
    const TITLE: &str = "📊 Price Correlation Analysis";
    let corr = match result {
        QueryResult::Failed { error } => return Some(Section::failed(TITLE, error)),
        QueryResult::Rows(rows) => rows.first()?,
    };
    let fixed = |v: f64| format!("{:.4}", v);

    Some(Section {
        facts: vec![
            Metric {
                label: "Price vs Square Footage",
                value: or_na(corr.price_sqft_correlation, fixed),
            },
            Metric {
                label: "Price vs Bedrooms",
                value: or_na(corr.price_bedrooms_correlation, fixed),
            },
            Metric {
                label: "Price vs Bathrooms",
                value: or_na(corr.price_bathrooms_correlation, fixed),
            },
        ],
        note: "Correlation ranges from -1 to 1. Values closer to 1 indicate strong positive correlation."
            .to_string(),
        ..Section::new(TITLE)
    })
}

fn bedroom_label(bedrooms: i32) -> String {
    if bedrooms > 0 {
        format!("{} BR", bedrooms)
    } else {
        "Studio".to_string()
    }
}

fn or_na(value: Option<f64>, format: impl Fn(f64) -> String) -> String {
    value.map(format).unwrap_or_else(|| "N/A".to_string())
}

fn money(value: f64) -> String {
    format!("${}", format_number(value, 0))
}

fn money_cents(value: f64) -> String {
    format!("${}", format_number(value, 2))
}

/// Fixed decimals with `,` thousands separators, e.g. `1,234,567.89`
pub fn format_number(n: f64, decimals: usize) -> String {
    let s = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match s.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (s.as_str(), None),
    };

    let int_val: u64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }

    // "-0" after rounding is just zero
    if n.is_sign_negative() && s.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T: ToFormattedString>(n: T) -> String {
    n.to_formatted_string(&Locale::en)
}
