//! Tax Policy
//!
//! Decides, per billing country, whether Stripe computes tax automatically or
//! a pre-created manual tax rate is attached to the line item.

use std::collections::{BTreeSet, HashMap};

use crate::error::{PaymentError, Result};

/// Countries where Stripe Tax can compute tax on its own
const AUTOMATIC_TAX_COUNTRIES: &[&str] = &[
    "US", "GB", "DE", "FR", "IT", "ES", "NL", "CA", "AU", "NO", "CH", "NZ", "SG", "JP",
];

/// Manual tax rate ids for countries Stripe Tax does not cover
const MANUAL_TAX_RATES: &[(&str, &str)] = &[
    ("PK", "txr_1RiyLpFbQiY6rDWWSj1ruxGN"),
    ("IN", "txr_1RizcXFbQiY6rDWWpAandcBg"),
    ("BD", "txr_1RizfhFbQiY6rDWWTgTPYW82"),
    ("AE", "txr_1RizgZFbQiY6rDWWbRBs1rKs"),
];

/// How tax is applied to a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaxTreatment {
    /// Stripe computes tax from the customer's address
    Automatic,
    /// Attach this tax rate id to the line item
    ManualRate(String),
    /// Attach an explicitly empty tax rate list
    NoTax,
}

/// Immutable country → tax treatment table
#[derive(Clone, Debug)]
pub struct TaxPolicy {
    automatic: BTreeSet<String>,
    manual_rates: HashMap<String, String>,
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            automatic: AUTOMATIC_TAX_COUNTRIES.iter().map(|c| (*c).to_string()).collect(),
            manual_rates: MANUAL_TAX_RATES
                .iter()
                .map(|(country, rate)| ((*country).to_string(), (*rate).to_string()))
                .collect(),
        }
    }
}

impl TaxPolicy {
    /// Build a policy from explicit tables.
    ///
    /// Country codes are normalized to upper case. A country listed in both
    /// tables is rejected.
    pub fn new<A, M, C, R>(automatic: A, manual_rates: M) -> Result<Self>
    where
        A: IntoIterator<Item = C>,
        M: IntoIterator<Item = (C, R)>,
        C: AsRef<str>,
        R: Into<String>,
    {
        let automatic: BTreeSet<String> = automatic
            .into_iter()
            .map(|c| normalize_country(c.as_ref()))
            .collect();

        let mut rates = HashMap::new();
        for (country, rate) in manual_rates {
            let country = normalize_country(country.as_ref());
            if automatic.contains(&country) {
                return Err(PaymentError::Config(format!(
                    "Country {country} is configured for both automatic and manual tax"
                )));
            }
            rates.insert(country, rate.into());
        }

        Ok(Self {
            automatic,
            manual_rates: rates,
        })
    }

    /// Resolve the tax treatment for a billing country
    pub fn treatment(&self, country: &str) -> TaxTreatment {
        let country = normalize_country(country);
        if self.automatic.contains(&country) {
            TaxTreatment::Automatic
        } else if let Some(rate) = self.manual_rates.get(&country) {
            TaxTreatment::ManualRate(rate.clone())
        } else {
            TaxTreatment::NoTax
        }
    }

    pub fn automatic_countries(&self) -> impl Iterator<Item = &str> {
        self.automatic.iter().map(String::as_str)
    }

    pub fn manual_rates(&self) -> impl Iterator<Item = (&str, &str)> {
        self.manual_rates
            .iter()
            .map(|(country, rate)| (country.as_str(), rate.as_str()))
    }

    pub fn manual_rate(&self, country: &str) -> Option<&str> {
        self.manual_rates.get(&normalize_country(country)).map(String::as_str)
    }
}

/// Parse a comma-separated country list, e.g. `"US, gb,DE"`
pub fn parse_country_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(normalize_country)
        .collect()
}

/// Parse `"PK=txr_1,IN=txr_2"` into country/rate pairs
pub fn parse_rate_map(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (country, rate) = entry.split_once('=').ok_or_else(|| {
                PaymentError::Config(format!("Invalid tax rate entry '{entry}', expected CC=txr_..."))
            })?;
            let (country, rate) = (country.trim(), rate.trim());
            if country.is_empty() || rate.is_empty() {
                return Err(PaymentError::Config(format!(
                    "Invalid tax rate entry '{entry}', expected CC=txr_..."
                )));
            }
            Ok((normalize_country(country), rate.to_string()))
        })
        .collect()
}

fn normalize_country(country: &str) -> String {
    country.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automatic_countries() {
        let policy = TaxPolicy::default();
        for country in AUTOMATIC_TAX_COUNTRIES {
            assert_eq!(policy.treatment(country), TaxTreatment::Automatic);
        }
    }

    #[test]
    fn test_manual_rate_countries() {
        let policy = TaxPolicy::default();
        for (country, rate) in MANUAL_TAX_RATES {
            assert_eq!(
                policy.treatment(country),
                TaxTreatment::ManualRate((*rate).to_string())
            );
        }
    }

    #[test]
    fn test_unlisted_country_gets_no_tax() {
        let policy = TaxPolicy::default();
        assert_eq!(policy.treatment("BR"), TaxTreatment::NoTax);
        assert_eq!(policy.treatment("ZA"), TaxTreatment::NoTax);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let policy = TaxPolicy::default();
        assert_eq!(policy.treatment("us"), TaxTreatment::Automatic);
        assert_eq!(policy.manual_rate(" pk "), Some("txr_1RiyLpFbQiY6rDWWSj1ruxGN"));
    }

    #[test]
    fn test_default_tables_do_not_overlap() {
        let policy = TaxPolicy::default();
        for country in policy.automatic_countries() {
            assert!(policy.manual_rate(country).is_none(), "{country} in both tables");
        }
    }

    #[test]
    fn test_overlap_is_rejected() {
        let result = TaxPolicy::new(["US", "DE"], [("us", "txr_conflict")]);
        assert!(matches!(result, Err(PaymentError::Config(_))));
    }

    #[test]
    fn test_parse_overrides() {
        assert_eq!(parse_country_list("us, gb,,DE "), vec!["US", "GB", "DE"]);

        let rates = parse_rate_map("pk=txr_a, IN = txr_b").unwrap();
        assert_eq!(
            rates,
            vec![("PK".to_string(), "txr_a".to_string()), ("IN".to_string(), "txr_b".to_string())]
        );

        assert!(parse_rate_map("PK").is_err());
        assert!(parse_rate_map("PK=").is_err());
    }
}
