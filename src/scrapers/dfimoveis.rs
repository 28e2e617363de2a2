use crate::models::Property;
use crate::parsing::{parse_count, parse_price, parse_size, squash_whitespace};
use crate::scrapers::traits::ListingSource;
use crate::scrapers::types::SearchParams;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

const BASE_URL: &str = "https://www.dfimoveis.com.br";

/// Category slugs accepted in DF Imóveis search URLs
pub const PROPERTY_TYPES: &[&str] = &[
    "apartamento",
    "casa",
    "casa-condominio",
    "galpao",
    "garagem",
    "hotel-flat",
    "kitnet",
    "loja",
    "lote",
    "loteamento",
    "ponto-comercial",
    "predio",
    "rural",
    "sala",
];

/// DF Imóveis (dfimoveis.com.br), server-rendered results
pub struct DfImoveis {
    card: Selector,
    title: Selector,
    headline: Selector,
    price: Selector,
    span: Selector,
    anchor: Selector,
    detail: Selector,
    bedrooms_label: Regex,
    parking_label: Regex,
}

impl DfImoveis {
    pub fn new() -> Self {
        let css = |s: &str| Selector::parse(s).expect("static selector");
        Self {
            card: css("div.new-info"),
            title: css("h2.new-title.phrase"),
            headline: css("h3.new-desc.phrase"),
            price: css("div.new-price span"),
            span: css("span"),
            anchor: css("a"),
            detail: css("p.texto-descricao"),
            bedrooms_label: Regex::new(r"\b[Qq]uartos?\b").expect("valid regex"),
            parking_label: Regex::new(r"\b[Vv]agas?\b").expect("valid regex"),
        }
    }

    fn parse_card(&self, card: ElementRef, params: &SearchParams) -> Option<Property> {
        let title = card.select(&self.title).next();
        let address = title.map(text_of).unwrap_or_default();
        let headline = card.select(&self.headline).next().map(text_of).unwrap_or_default();

        if address.is_empty() && headline.is_empty() {
            return None;
        }

        let link = title
            .and_then(|t| self.link_near(t))
            .map(|href| absolute(&href));

        let spans: Vec<String> = card.select(&self.span).map(text_of).collect();
        let size = spans.iter().find(|s| s.contains("m²")).and_then(|s| parse_size(s));
        let bedrooms = spans
            .iter()
            .find(|s| self.bedrooms_label.is_match(s))
            .and_then(|s| parse_count(s));
        let parking_spaces = spans
            .iter()
            .find(|s| self.parking_label.is_match(s))
            .and_then(|s| parse_count(s));
        let price = card
            .select(&self.price)
            .next()
            .map(text_of)
            .and_then(|p| parse_price(&p));

        let description = [headline.as_str(), address.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" - ");

        Some(Property {
            description,
            address,
            property_type: classify(&headline, params),
            price,
            size,
            bedrooms,
            parking_spaces,
            contract_type: params.contract_type,
            link,
            ..Default::default()
        })
    }

    /// The listing link sits on the title itself, on an enclosing anchor, or inside it
    fn link_near(&self, element: ElementRef) -> Option<String> {
        if element.value().name() == "a" {
            return element.value().attr("href").map(str::to_string);
        }
        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| a.value().name() == "a")
            .or_else(|| element.select(&self.anchor).next())
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
    }
}

impl Default for DfImoveis {
    fn default() -> Self {
        Self::new()
    }
}

fn text_of(element: ElementRef) -> String {
    squash_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn absolute(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{BASE_URL}{href}")
    }
}

/// First known category named in the headline, else the searched category
fn classify(headline: &str, params: &SearchParams) -> String {
    let lowered = headline.to_lowercase();
    PROPERTY_TYPES
        .iter()
        .find(|kind| lowered.contains(*kind))
        .map(|kind| kind.to_string())
        .or_else(|| params.property_type.clone())
        .unwrap_or_else(|| "imoveis".to_string())
}

impl ListingSource for DfImoveis {
    fn source_name(&self) -> &'static str {
        "dfimoveis"
    }

    fn page_url(&self, params: &SearchParams, page: usize) -> String {
        let kind = params.property_type.as_deref().unwrap_or("imoveis");
        format!(
            "{BASE_URL}/{}/df/todos/{kind}?pagina={page}",
            params.contract_type
        )
    }

    fn parse_listings(&self, html: &str, params: &SearchParams) -> Vec<Property> {
        let document = Html::parse_document(html);
        document
            .select(&self.card)
            .filter_map(|card| self.parse_card(card, params))
            .collect()
    }

    fn parse_detail_description(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let text = document
            .select(&self.detail)
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!text.is_empty()).then_some(text)
    }

    fn property_types(&self) -> &'static [&'static str] {
        PROPERTY_TYPES
    }
}
