//! Lightweight entity extraction over corrected utterances

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::lexicon::DomainLexicon;

/// "500만원", "1,000 원", "3억원", "5천만 원"
static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d[\d,]*(?:\.\d+)?\s*(?:조|억|천만|백만|만|천)?\s*원")
        .expect("amount pattern is valid")
});

/// "6개월", "1년", "2 주"
static PERIOD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s*(?:개월|년|주|일)").expect("period pattern is valid"));

static NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("number pattern is valid"));

/// Entities found in one utterance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    pub amounts: Vec<String>,
    pub products: Vec<String>,
    pub numbers: Vec<String>,
    pub periods: Vec<String>,
    pub currencies: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
            && self.products.is_empty()
            && self.numbers.is_empty()
            && self.periods.is_empty()
            && self.currencies.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Extract amounts, catalog products, bare numbers, periods and currencies
pub fn extract_entities(text: &str, lexicon: &DomainLexicon) -> Entities {
    let mut entities = Entities::default();
    let compact: String = text.split_whitespace().collect();

    for m in AMOUNT_PATTERN.find_iter(text) {
        push_unique(&mut entities.amounts, m.as_str().split_whitespace().collect());
    }

    for m in PERIOD_PATTERN.find_iter(text) {
        push_unique(&mut entities.periods, m.as_str().split_whitespace().collect());
    }
    for period in lexicon.periods() {
        if compact.contains(period.as_str()) {
            push_unique(&mut entities.periods, period.clone());
        }
    }

    for m in NUMBER_PATTERN.find_iter(text) {
        push_unique(&mut entities.numbers, m.as_str().to_string());
    }

    for product in lexicon.products() {
        if compact.contains(product.as_str()) {
            push_unique(&mut entities.products, product.clone());
        }
    }

    for currency in lexicon.currencies() {
        if compact.contains(currency.as_str()) {
            push_unique(&mut entities.currencies, currency.clone());
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> DomainLexicon {
        DomainLexicon::from_toml_str(
            r#"
            products = ["정기예금", "적금"]
            periods = ["만기"]
            currencies = ["달러", "엔"]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn extracts_amounts_and_numbers() {
        let entities = extract_entities("1,000만원 하고 5천만 원 넣을게요", &lexicon());
        assert_eq!(entities.amounts, vec!["1,000만원", "5천만원"]);
        assert_eq!(entities.numbers, vec!["1,000", "5"]);
    }

    #[test]
    fn extracts_products_periods_currencies() {
        let entities = extract_entities("정기예금 12개월 만기 달러로", &lexicon());
        assert_eq!(entities.products, vec!["정기예금"]);
        assert_eq!(entities.periods, vec!["12개월", "만기"]);
        assert_eq!(entities.currencies, vec!["달러"]);
        assert!(entities.amounts.is_empty());
    }

    #[test]
    fn plain_question_has_no_amount() {
        let entities = extract_entities("정기예금 금리 알려줘", &lexicon());
        assert!(entities.amounts.is_empty());
        assert!(entities.numbers.is_empty());
        assert_eq!(entities.products, vec!["정기예금"]);
    }
}
