use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of contract a listing was published under
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    #[default]
    Venda,
    Aluguel,
}

impl ContractType {
    pub const ALL: [ContractType; 2] = [ContractType::Venda, ContractType::Aluguel];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Venda => "venda",
            ContractType::Aluguel => "aluguel",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "venda" | "sale" => Ok(ContractType::Venda),
            "aluguel" | "locacao" | "locação" | "rent" => Ok(ContractType::Aluguel),
            other => Err(format!("unknown contract type '{other}'")),
        }
    }
}

/// Resolved geographic position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Core property record shared by every scraper, the pipeline and the stores.
///
/// Older exports use different column names for the same fields (`size_m2`,
/// `bedroom`, `car_spaces`, ...); the aliases let those files load unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Property {
    pub description: String,
    pub address: String,
    #[serde(alias = "type")]
    pub property_type: String,
    #[serde(deserialize_with = "lenient::number")]
    pub price: Option<f64>,
    #[serde(alias = "size_m2", deserialize_with = "lenient::number")]
    pub size: Option<f64>,
    #[serde(alias = "bedroom", deserialize_with = "lenient::count")]
    pub bedrooms: Option<u32>,
    #[serde(deserialize_with = "lenient::count")]
    pub bathrooms: Option<u32>,
    #[serde(
        alias = "car_spaces",
        alias = "cars_spaces",
        alias = "parking",
        deserialize_with = "lenient::count"
    )]
    pub parking_spaces: Option<u32>,
    pub contract_type: ContractType,
    pub state: Option<String>,
    pub city: Option<String>,
    #[serde(alias = "page_link")]
    pub link: Option<String>,
    pub data_source: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Property {
    /// Column order of every delimited file the crate writes
    pub const COLUMNS: [&'static str; 16] = [
        "description",
        "address",
        "property_type",
        "price",
        "size",
        "bedrooms",
        "bathrooms",
        "parking_spaces",
        "contract_type",
        "state",
        "city",
        "link",
        "data_source",
        "latitude",
        "longitude",
        "timestamp",
    ];

    /// Key used by checkpoint/resume to recognise already written records
    pub fn resume_key(&self) -> Option<&str> {
        let key = self.description.trim();
        (!key.is_empty()).then_some(key)
    }

    /// Text handed to the geocoder: the address when present, else the description
    pub fn location_text(&self) -> &str {
        if self.address.trim().is_empty() {
            self.description.trim()
        } else {
            self.address.trim()
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    pub fn set_coordinates(&mut self, coords: Option<Coordinates>) {
        self.latitude = coords.map(|c| c.latitude);
        self.longitude = coords.map(|c| c.longitude);
    }

    /// Serialized form of every field; two records with the same fingerprint
    /// are exact duplicates.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Numeric columns written by older exports hold "2.0", "3" or raw label text.
mod lenient {
    use super::*;
    use crate::parsing::{parse_count, parse_price};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Int(n)) => Some(n as f64),
            Some(Raw::Float(f)) => f.is_finite().then_some(f),
            Some(Raw::Text(t)) => parse_price(&t),
            None => None,
        })
    }

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Int(n)) => u32::try_from(n).ok(),
            Some(Raw::Float(f)) if f.is_finite() && f >= 0.0 => Some(f as u32),
            Some(Raw::Float(_)) => None,
            Some(Raw::Text(t)) => parse_count(&t),
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_type_parses_site_spellings() {
        assert_eq!("locacao".parse::<ContractType>(), Ok(ContractType::Aluguel));
        assert_eq!(" Venda ".parse::<ContractType>(), Ok(ContractType::Venda));
        assert!("leilao".parse::<ContractType>().is_err());
    }

    #[test]
    fn legacy_column_names_deserialize() {
        let json = r#"{"description":"SHS Quadra 06","type":"Loja","size_m2":86.0,"bedroom":2,"car_spaces":1,"contract_type":"aluguel"}"#;
        let property: Property = serde_json::from_str(json).unwrap();
        assert_eq!(property.property_type, "Loja");
        assert_eq!(property.size, Some(86.0));
        assert_eq!(property.bedrooms, Some(2));
        assert_eq!(property.parking_spaces, Some(1));
        assert_eq!(property.contract_type, ContractType::Aluguel);
    }

    #[test]
    fn numeric_columns_accept_floats_and_text() {
        let json = r#"{"description":"Casa","price":"R$ 850.000","bedrooms":3.0,"bathrooms":"2 banheiros","parking_spaces":null}"#;
        let property: Property = serde_json::from_str(json).unwrap();
        assert_eq!(property.price, Some(850_000.0));
        assert_eq!(property.bedrooms, Some(3));
        assert_eq!(property.bathrooms, Some(2));
        assert_eq!(property.parking_spaces, None);
    }

    #[test]
    fn location_text_prefers_address() {
        let mut property = Property {
            description: "Apartamento na Asa Sul".into(),
            ..Default::default()
        };
        assert_eq!(property.location_text(), "Apartamento na Asa Sul");
        property.address = "SQS 308, Asa Sul".into();
        assert_eq!(property.location_text(), "SQS 308, Asa Sul");
    }

    #[test]
    fn resume_key_ignores_blank_descriptions() {
        let property = Property {
            description: "   ".into(),
            ..Default::default()
        };
        assert_eq!(property.resume_key(), None);
    }
}
