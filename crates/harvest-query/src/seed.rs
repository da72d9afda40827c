//! Case-number seed queries.

use crate::descriptor::QueryDescriptor;
use crate::facet::Facet;
use regex::Regex;
use std::sync::OnceLock;

/// Strip the ordinal (`<digits>号`) from a case number, leaving the prefix
/// shared by every case of that court, year and kind.
///
/// `（2013）沪高民一（民）申字第1313号` becomes `（2013）沪高民一（民）申字第`.
#[must_use]
pub fn case_template(case_number: &str) -> Option<String> {
    static ORDINAL: OnceLock<Regex> = OnceLock::new();
    let ordinal = ORDINAL.get_or_init(|| Regex::new(r"\d+号").expect("valid regex"));

    let case_number = case_number.trim();
    match ordinal.find(case_number) {
        Some(m) => Some(format!("{}{}", &case_number[..m.start()], &case_number[m.end()..])),
        None => {
            tracing::warn!("casenumber {} does not match pattern", case_number);
            None
        }
    }
}

/// First-page query over every case sharing `template`.
#[must_use]
pub fn case_seed(template: &str) -> QueryDescriptor {
    QueryDescriptor::new().extended(Facet::CaseNumber, template)
}
