use std::borrow::Cow;


/// Rounds to `places` decimal places, halves to even.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

/// Whole-number share of `part` in `total`, halves to even; 0 for an empty total.
pub(crate) fn percent_of(part: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round_ties_even() as u64
}


/// Decoded `application/x-www-form-urlencoded` pairs, keeping repeated keys.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct FormFields {
    pairs: Vec<(String, String)>,
}

impl FormFields {
    pub fn parse(bytes: &[u8]) -> FormFields {
        let pairs = form_urlencoded::parse(bytes)
            .map(|(k, v): (Cow<str>, Cow<str>)| (k.into_owned(), v.into_owned()))
            .collect();
        FormFields { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like `get`, but treats an empty value as missing.
    pub fn get_nonempty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs.iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }
}
