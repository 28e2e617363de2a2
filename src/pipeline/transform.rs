use crate::models::Property;

/// Two-letter codes of the Brazilian federative units
const STATES: &[(&str, &str)] = &[
    ("AC", "Acre"),
    ("AL", "Alagoas"),
    ("AP", "Amapá"),
    ("AM", "Amazonas"),
    ("BA", "Bahia"),
    ("CE", "Ceará"),
    ("DF", "Distrito Federal"),
    ("ES", "Espírito Santo"),
    ("GO", "Goiás"),
    ("MA", "Maranhão"),
    ("MT", "Mato Grosso"),
    ("MS", "Mato Grosso do Sul"),
    ("MG", "Minas Gerais"),
    ("PA", "Pará"),
    ("PB", "Paraíba"),
    ("PR", "Paraná"),
    ("PE", "Pernambuco"),
    ("PI", "Piauí"),
    ("RJ", "Rio de Janeiro"),
    ("RN", "Rio Grande do Norte"),
    ("RS", "Rio Grande do Sul"),
    ("RO", "Rondônia"),
    ("RR", "Roraima"),
    ("SC", "Santa Catarina"),
    ("SP", "São Paulo"),
    ("SE", "Sergipe"),
    ("TO", "Tocantins"),
];

/// Full state name for a two-letter code; anything else is returned unchanged.
pub fn expand_state(value: &str) -> String {
    let code = value.trim();
    STATES
        .iter()
        .find(|(abbr, _)| abbr.eq_ignore_ascii_case(code))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// "ÁGUAS CLARAS" -> "Águas Claras"
pub fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Trimmed, with the first letter upper-cased
pub fn capitalize(value: &str) -> String {
    let trimmed = value.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Normalizes state, city and description text.
#[derive(Debug, Default)]
pub struct DataTransformer;

impl DataTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform(&self, records: Vec<Property>) -> Vec<Property> {
        records.into_iter().map(|r| self.transform_one(r)).collect()
    }

    pub fn transform_one(&self, mut record: Property) -> Property {
        record.state = record.state.as_deref().map(expand_state);
        record.city = record.city.as_deref().map(title_case);
        record.description = capitalize(&record.description);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_state_codes() {
        assert_eq!(expand_state("DF"), "Distrito Federal");
        assert_eq!(expand_state("sp"), "São Paulo");
        assert_eq!(expand_state("Goiás"), "Goiás");
    }

    #[test]
    fn normalizes_city_and_description() {
        let record = Property {
            description: "  apartamento com vista para o Parque ".into(),
            city: Some("ÁGUAS CLARAS".into()),
            state: Some("DF".into()),
            ..Default::default()
        };
        let out = DataTransformer::new().transform_one(record);
        assert_eq!(out.description, "Apartamento com vista para o Parque");
        assert_eq!(out.city.as_deref(), Some("Águas Claras"));
        assert_eq!(out.state.as_deref(), Some("Distrito Federal"));
    }
}
