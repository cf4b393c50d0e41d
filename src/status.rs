use crate::model::FieldValue;


#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Status {
    Pending,
    Active,
    Completed,
    Delivered,
    Unknown,
}


// checked in order; the first fragment found in the lowercased text wins
const ENGLISH_FRAGMENTS: [(&'static str, Status); 11] = [
    ("inactive", Status::Unknown),
    ("cancel", Status::Unknown),
    ("undeliver", Status::Unknown),
    ("not ", Status::Unknown),
    ("pend", Status::Pending),
    ("deliver", Status::Delivered),
    ("complet", Status::Completed),
    ("process", Status::Active),
    ("transit", Status::Active),
    ("ship", Status::Active),
    ("active", Status::Active),
];

const ARABIC_STATUSES: [(&'static str, Status); 5] = [
    ("قيد الانتظار", Status::Pending),
    ("قيد المعالجة", Status::Active),
    ("قيد التنفيذ", Status::Active),
    ("تم الشحن", Status::Active),
    ("تم التسليم", Status::Delivered),
];


impl Status {
    pub fn canonicalize(raw: &str) -> Status {
        let trimmed = raw.trim();
        if let Some((_, status)) = ARABIC_STATUSES.iter().find(|(s, _)| *s == trimmed) {
            return *status;
        }

        let lower = trimmed.to_lowercase();
        ENGLISH_FRAGMENTS.iter()
            .find(|(fragment, _)| lower.contains(fragment))
            .map(|(_, status)| *status)
            .unwrap_or(Status::Unknown)
    }

    pub fn of_value(value: Option<&FieldValue>) -> Status {
        match value.and_then(|v| v.as_str()) {
            Some(raw) => Status::canonicalize(raw),
            None => Status::Unknown,
        }
    }

    /// Not yet delivered or closed: pending, or somewhere along the way.
    pub fn is_open(&self) -> bool {
        matches!(self, Status::Pending | Status::Active)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_fragments_ignore_case() {
        assert_eq!(Status::canonicalize("Pending"), Status::Pending);
        assert_eq!(Status::canonicalize("PENDING APPROVAL"), Status::Pending);
        assert_eq!(Status::canonicalize("processing"), Status::Active);
        assert_eq!(Status::canonicalize("In Transit"), Status::Active);
        assert_eq!(Status::canonicalize("in_transit"), Status::Active);
        assert_eq!(Status::canonicalize("Shipped"), Status::Active);
        assert_eq!(Status::canonicalize("active"), Status::Active);
        assert_eq!(Status::canonicalize("Completed"), Status::Completed);
        assert_eq!(Status::canonicalize("delivered"), Status::Delivered);
    }

    #[test]
    fn negations_are_not_active() {
        assert_eq!(Status::canonicalize("Inactive"), Status::Unknown);
        assert_eq!(Status::canonicalize("cancelled"), Status::Unknown);
        assert_eq!(Status::canonicalize("Undelivered"), Status::Unknown);
        assert_eq!(Status::canonicalize("not shipped"), Status::Unknown);
        assert_eq!(Status::canonicalize("Not yet processed"), Status::Unknown);
    }

    #[test]
    fn arabic_statuses_match_exactly() {
        assert_eq!(Status::canonicalize("قيد الانتظار"), Status::Pending);
        assert_eq!(Status::canonicalize(" قيد المعالجة "), Status::Active);
        assert_eq!(Status::canonicalize("قيد التنفيذ"), Status::Active);
        assert_eq!(Status::canonicalize("تم الشحن"), Status::Active);
        assert_eq!(Status::canonicalize("تم التسليم"), Status::Delivered);
        assert_eq!(Status::canonicalize("تم"), Status::Unknown);
    }

    #[test]
    fn non_text_is_unknown() {
        assert_eq!(Status::of_value(None), Status::Unknown);
        assert_eq!(Status::of_value(Some(&FieldValue::Integer(1))), Status::Unknown);
        assert_eq!(Status::of_value(Some(&FieldValue::Text("".to_owned()))), Status::Unknown);
    }

    #[test]
    fn open_statuses() {
        assert!(Status::Pending.is_open());
        assert!(Status::Active.is_open());
        assert!(!Status::Delivered.is_open());
        assert!(!Status::Completed.is_open());
        assert!(!Status::Unknown.is_open());
    }
}
