use crate::models::{ContractType, Property};
use crate::parsing::{parse_count, parse_price, parse_size, squash_whitespace};
use crate::scrapers::browser::has_unrendered_templates;
use crate::scrapers::traits::ListingSource;
use crate::scrapers::types::SearchParams;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

pub const PROPERTY_TYPES: &[&str] = &["apartamento", "casa", "flat"];

/// NetImóveis (netimoveis.com). Cards are filled in by page scripts, so this
/// source needs the browser fetcher.
pub struct NetImoveis {
    card: Selector,
    title: Selector,
    address: Selector,
    area: Selector,
    bedrooms: Selector,
    parking: Selector,
    bathrooms: Selector,
    price: Selector,
}

impl NetImoveis {
    pub fn new() -> Self {
        let css = |s: &str| Selector::parse(s).expect("static selector");
        Self {
            card: css("section.imovel-info"),
            title: css("h2"),
            address: css("div.endereco"),
            area: css("div.caracteristica.area"),
            bedrooms: css("div.caracteristica.quartos"),
            parking: css("div.caracteristica.vagas"),
            bathrooms: css("div.caracteristica.banheiros"),
            price: css("div.valor"),
        }
    }

    fn field(&self, card: ElementRef, selector: &Selector) -> Option<String> {
        card.select(selector)
            .next()
            .map(|e| squash_whitespace(&e.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
    }

    fn parse_card(&self, card: ElementRef, params: &SearchParams) -> Option<Property> {
        let description = self.field(card, &self.title).unwrap_or_default();
        let address = self.field(card, &self.address).unwrap_or_default();
        let area = self.field(card, &self.area);
        let bedrooms = self.field(card, &self.bedrooms);
        let parking = self.field(card, &self.parking);
        let bathrooms = self.field(card, &self.bathrooms);
        let price = self.field(card, &self.price);

        let raw = [&area, &bedrooms, &parking, &bathrooms, &price];
        if has_unrendered_templates(&description)
            || has_unrendered_templates(&address)
            || raw.iter().any(|f| f.as_deref().is_some_and(has_unrendered_templates))
        {
            debug!("Skipping card with unrendered templates");
            return None;
        }
        if description.is_empty() && address.is_empty() {
            return None;
        }

        Some(Property {
            description,
            address,
            property_type: params.property_type.clone().unwrap_or_default(),
            price: price.as_deref().and_then(parse_price),
            size: area.as_deref().and_then(parse_size),
            bedrooms: bedrooms.as_deref().and_then(parse_count),
            bathrooms: bathrooms.as_deref().and_then(parse_count),
            parking_spaces: parking.as_deref().and_then(parse_count),
            contract_type: params.contract_type,
            ..Default::default()
        })
    }
}

impl Default for NetImoveis {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingSource for NetImoveis {
    fn source_name(&self) -> &'static str {
        "netimoveis"
    }

    fn page_url(&self, params: &SearchParams, page: usize) -> String {
        // Rentals are "locacao" in NetImóveis URLs
        let transaction = match params.contract_type {
            ContractType::Venda => "venda",
            ContractType::Aluguel => "locacao",
        };
        let kind = params
            .property_type
            .as_deref()
            .filter(|k| PROPERTY_TYPES.contains(k));
        match kind {
            Some(kind) => format!(
                "https://www.netimoveis.com/{transaction}/distrito-federal/brasilia/{kind}?transacao={transaction}&localizacao=BR-DF-brasilia---&tipo={kind}&pagina={page}"
            ),
            None => format!(
                "https://www.netimoveis.com/{transaction}/distrito-federal/brasilia?transacao={transaction}&localizacao=BR-DF-brasilia---&pagina={page}"
            ),
        }
    }

    fn parse_listings(&self, html: &str, params: &SearchParams) -> Vec<Property> {
        let document = Html::parse_document(html);
        document
            .select(&self.card)
            .filter_map(|card| self.parse_card(card, params))
            .collect()
    }

    fn requires_browser(&self) -> bool {
        true
    }

    fn property_types(&self) -> &'static [&'static str] {
        PROPERTY_TYPES
    }
}
