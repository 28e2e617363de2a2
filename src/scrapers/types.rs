use crate::models::ContractType;
use serde::{Deserialize, Serialize};

/// What a single scrape run asks a listing site for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Sale or rental listings
    pub contract_type: ContractType,
    /// Site category slug ("apartamento", "casa", ...); `None` searches every type
    pub property_type: Option<String>,
}

impl SearchParams {
    pub fn new(contract_type: ContractType, property_type: Option<String>) -> Self {
        Self {
            contract_type,
            property_type,
        }
    }

    /// Label used in logs and output file names
    pub fn label(&self) -> String {
        match &self.property_type {
            Some(kind) => format!("{}_{}", self.contract_type, kind),
            None => self.contract_type.to_string(),
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            contract_type: ContractType::Venda,
            property_type: None,
        }
    }
}
