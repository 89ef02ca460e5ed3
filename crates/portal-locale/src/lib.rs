//! Market/language selection, translation lookup and locale-aware formatting.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const CRATE_NAME: &str = "portal-locale";

const BUILTIN_CATALOG: &str = include_str!("../data/locales.yaml");

const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d";

fn is_valid_date_format(pattern: &str) -> bool {
    !pattern.is_empty() && StrftimeItems::new(pattern).all(|item| !matches!(item, Item::Error))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketCode {
    Us,
    Ca,
    Uk,
    De,
    Fr,
    Es,
    It,
    Au,
    Mx,
    Br,
}

impl MarketCode {
    pub const ALL: [MarketCode; 10] = [
        Self::Us,
        Self::Ca,
        Self::Uk,
        Self::De,
        Self::Fr,
        Self::Es,
        Self::It,
        Self::Au,
        Self::Mx,
        Self::Br,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Ca => "CA",
            Self::Uk => "UK",
            Self::De => "DE",
            Self::Fr => "FR",
            Self::Es => "ES",
            Self::It => "IT",
            Self::Au => "AU",
            Self::Mx => "MX",
            Self::Br => "BR",
        }
    }
}

impl fmt::Display for MarketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketCode {
    type Err = LocaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LocaleError::UnknownMarket(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    En,
    Fr,
    De,
    Es,
    It,
    Pt,
}

impl LanguageCode {
    pub const ALL: [LanguageCode; 6] = [Self::En, Self::Fr, Self::De, Self::Es, Self::It, Self::Pt];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Fr => "fr",
            Self::De => "de",
            Self::Es => "es",
            Self::It => "it",
            Self::Pt => "pt",
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Fr => "Français",
            Self::De => "Deutsch",
            Self::Es => "Español",
            Self::It => "Italiano",
            Self::Pt => "Português",
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageCode {
    type Err = LocaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| LocaleError::UnknownLanguage(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyPosition {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub position: CurrencyPosition,
    pub thousands_separator: char,
    pub decimal_separator: char,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub market: MarketCode,
    pub label: String,
    pub native_label: String,
    pub flag: String,
    pub languages: Vec<LanguageCode>,
    pub default_language: LanguageCode,
    pub currency: CurrencyFormat,
    /// chrono `strftime` pattern.
    pub date_format: String,
}

impl MarketConfig {
    pub fn offers(&self, language: LanguageCode) -> bool {
        self.languages.contains(&language)
    }

    pub fn has_multiple_languages(&self) -> bool {
        self.languages.len() > 1
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocaleError {
    #[error("unknown market `{0}`")]
    UnknownMarket(String),
    #[error("unknown language `{0}`")]
    UnknownLanguage(String),
    #[error("language {language} is not offered in market {market}")]
    UnsupportedLanguage {
        market: MarketCode,
        language: LanguageCode,
    },
    #[error("unknown role `{0}`")]
    UnknownRole(String),
    #[error("invalid locale catalog: {0}")]
    InvalidCatalog(String),
}

/// Market configurations plus one translation dictionary per language.
#[derive(Debug, Clone, Deserialize)]
pub struct LocaleCatalog {
    markets: Vec<MarketConfig>,
    translations: BTreeMap<LanguageCode, BTreeMap<String, String>>,
}

impl LocaleCatalog {
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG).context("parsing builtin locale catalog")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading locale catalog {}", path.display()))?;
        let catalog = Self::from_yaml_str(&yaml)
            .with_context(|| format!("parsing locale catalog {}", path.display()))?;
        info!(path = %path.display(), markets = catalog.markets.len(), "loaded locale catalog");
        Ok(catalog)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let catalog: LocaleCatalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), LocaleError> {
        if self.markets.is_empty() {
            return Err(LocaleError::InvalidCatalog("no markets defined".into()));
        }
        if !self.translations.contains_key(&LanguageCode::En) {
            return Err(LocaleError::InvalidCatalog("missing `en` dictionary".into()));
        }
        for m in &self.markets {
            if !m.offers(m.default_language) {
                return Err(LocaleError::InvalidCatalog(format!(
                    "market {} default language {} is not in its language set",
                    m.market, m.default_language
                )));
            }
            if !is_valid_date_format(&m.date_format) {
                return Err(LocaleError::InvalidCatalog(format!(
                    "market {} has an invalid date format `{}`",
                    m.market, m.date_format
                )));
            }
        }
        Ok(())
    }

    pub fn markets(&self) -> &[MarketConfig] {
        &self.markets
    }

    pub fn market(&self, code: MarketCode) -> Option<&MarketConfig> {
        self.markets.iter().find(|m| m.market == code)
    }

    fn market_index(&self, code: MarketCode) -> Result<usize, LocaleError> {
        self.markets
            .iter()
            .position(|m| m.market == code)
            .ok_or_else(|| LocaleError::UnknownMarket(code.to_string()))
    }

    fn lookup(&self, language: LanguageCode, key: &str) -> Option<&str> {
        self.translations
            .get(&language)
            .and_then(|dict| dict.get(key))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    Partner,
    AccountManager,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Partner => "partner",
            Self::AccountManager => "account-manager",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Partner => "Partner",
            Self::AccountManager => "Account Manager",
        }
    }
}

impl FromStr for UserRole {
    type Err = LocaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "partner" => Ok(Self::Partner),
            "account-manager" => Ok(Self::AccountManager),
            other => Err(LocaleError::UnknownRole(other.to_string())),
        }
    }
}

/// Current market, language and role for the portal session.
///
/// The language always belongs to the selected market's language set.
#[derive(Debug, Clone)]
pub struct LocaleContext {
    catalog: Arc<LocaleCatalog>,
    market_index: usize,
    language: LanguageCode,
    role: UserRole,
}

impl LocaleContext {
    pub fn new(catalog: Arc<LocaleCatalog>, market: MarketCode) -> Result<Self, LocaleError> {
        let market_index = catalog.market_index(market)?;
        let language = catalog.markets[market_index].default_language;
        Ok(Self {
            catalog,
            market_index,
            language,
            role: UserRole::Partner,
        })
    }

    pub fn catalog(&self) -> &LocaleCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &MarketConfig {
        &self.catalog.markets[self.market_index]
    }

    pub fn market(&self) -> MarketCode {
        self.config().market
    }

    pub fn language(&self) -> LanguageCode {
        self.language
    }

    pub fn role(&self) -> UserRole {
        self.role
    }

    pub fn set_role(&mut self, role: UserRole) {
        self.role = role;
    }

    pub fn is_account_manager(&self) -> bool {
        self.role == UserRole::AccountManager
    }

    /// Switching market always resets the language to the new market's default.
    pub fn set_market(&mut self, market: MarketCode) -> Result<(), LocaleError> {
        self.market_index = self.catalog.market_index(market)?;
        self.language = self.config().default_language;
        debug!(%market, language = %self.language, "market changed");
        Ok(())
    }

    pub fn set_language(&mut self, language: LanguageCode) -> Result<(), LocaleError> {
        if !self.config().offers(language) {
            return Err(LocaleError::UnsupportedLanguage {
                market: self.market(),
                language,
            });
        }
        self.language = language;
        Ok(())
    }

    /// Falls back to English, then to the key itself.
    pub fn t(&self, key: &str) -> String {
        self.catalog
            .lookup(self.language, key)
            .or_else(|| self.catalog.lookup(LanguageCode::En, key))
            .unwrap_or(key)
            .to_string()
    }

    pub fn format_currency(&self, amount: f64) -> String {
        let currency = &self.config().currency;
        let number = group_digits(
            amount.abs(),
            currency.thousands_separator,
            currency.decimal_separator,
        );
        let sign = if amount < 0.0 && number.chars().any(|c| c.is_ascii_digit() && c != '0') {
            "-"
        } else {
            ""
        };
        match currency.position {
            CurrencyPosition::Before => format!("{sign}{}{number}", currency.symbol),
            CurrencyPosition::After => format!("{sign}{number} {}", currency.symbol),
        }
    }

    pub fn format_date(&self, date: DateTime<Utc>) -> String {
        let mut out = String::new();
        if write!(out, "{}", date.format(&self.config().date_format)).is_err() {
            out.clear();
            out.push_str(&date.format(FALLBACK_DATE_FORMAT).to_string());
        }
        out
    }

    /// Market date plus 12-hour clock, e.g. "03/01/2024 9:05 AM" in the US.
    pub fn format_timestamp(&self, ts: DateTime<Utc>) -> String {
        format!("{} {}", self.format_date(ts), ts.format("%-I:%M %p"))
    }
}

fn group_digits(amount: f64, thousands: char, decimal: char) -> String {
    let cents = (amount * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let mut out = String::with_capacity(whole.len() + whole.len() / 3 + 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            out.push(thousands);
        }
        out.push(ch);
    }
    out.push(decimal);
    out.push_str(&format!("{:02}", cents % 100));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ctx(market: MarketCode) -> LocaleContext {
        let catalog = Arc::new(LocaleCatalog::builtin().expect("builtin catalog"));
        LocaleContext::new(catalog, market).expect("market exists")
    }

    #[test]
    fn switching_market_resets_language_to_market_default() {
        let mut locale = ctx(MarketCode::Ca);
        locale.set_language(LanguageCode::Fr).expect("fr offered in CA");
        assert_eq!(locale.language(), LanguageCode::Fr);

        locale.set_market(MarketCode::De).expect("DE exists");
        assert_eq!(locale.language(), LanguageCode::De);

        locale.set_market(MarketCode::Us).expect("US exists");
        assert_eq!(locale.language(), LanguageCode::En);
    }

    #[test]
    fn language_outside_market_set_is_rejected() {
        let mut locale = ctx(MarketCode::Us);
        let err = locale.set_language(LanguageCode::Pt).unwrap_err();
        assert_eq!(
            err,
            LocaleError::UnsupportedLanguage {
                market: MarketCode::Us,
                language: LanguageCode::Pt,
            }
        );
        assert_eq!(locale.language(), LanguageCode::En);
    }

    #[test]
    fn translation_falls_back_to_english_then_key() {
        let mut locale = ctx(MarketCode::Fr);
        assert_eq!(locale.t("myCases"), "Mes dossiers");
        assert_eq!(locale.t("noSuchKey"), "noSuchKey");
        locale.set_market(MarketCode::Uk).expect("UK exists");
        assert_eq!(locale.t("myCases"), "My Cases");
    }

    #[test]
    fn currency_uses_market_separators_and_symbol_position() {
        assert_eq!(ctx(MarketCode::Us).format_currency(1234.5), "$1,234.50");
        assert_eq!(ctx(MarketCode::De).format_currency(1234567.891), "1.234.567,89 €");
        assert_eq!(ctx(MarketCode::Br).format_currency(0.0), "R$0,00");
        assert_eq!(ctx(MarketCode::Uk).format_currency(-12.0), "-£12.00");
    }

    #[test]
    fn dates_follow_market_pattern() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T09:05:00Z")
            .expect("ts")
            .with_timezone(&Utc);
        assert_eq!(ctx(MarketCode::Us).format_date(ts), "03/01/2024");
        assert_eq!(ctx(MarketCode::De).format_date(ts), "01.03.2024");
        assert_eq!(ctx(MarketCode::Us).format_timestamp(ts), "03/01/2024 9:05 AM");
    }

    #[test]
    fn market_codes_parse_case_insensitively() {
        assert_eq!("us".parse::<MarketCode>(), Ok(MarketCode::Us));
        assert!(matches!(
            "zz".parse::<MarketCode>(),
            Err(LocaleError::UnknownMarket(_))
        ));
    }

    #[test]
    fn catalog_with_default_outside_language_set_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"
markets:
  - market: US
    label: United States
    native_label: United States
    flag: "x"
    languages: [en]
    default_language: fr
    currency: {{ symbol: "$", position: before, thousands_separator: ",", decimal_separator: "." }}
    date_format: "%m/%d/%Y"
translations:
  en: {{ home: Home }}
"#
        )
        .expect("write");
        let err = LocaleCatalog::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("default language fr"));
    }

    #[test]
    fn catalog_with_unusable_date_format_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"
markets:
  - market: US
    label: United States
    native_label: United States
    flag: "x"
    languages: [en]
    default_language: en
    currency: {{ symbol: "$", position: before, thousands_separator: ",", decimal_separator: "." }}
    date_format: "%Q"
translations:
  en: {{ home: Home }}
"#
        )
        .expect("write");
        let err = LocaleCatalog::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("invalid date format `%Q`"));
        assert!(is_valid_date_format("%d.%m.%Y"));
        assert!(!is_valid_date_format(""));
    }
}
