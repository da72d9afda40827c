//! Case-type labels as the site's own front end renders them.

/// Label for a numeric case-type code. Non-numeric or unknown codes pass
/// through unchanged.
#[must_use]
pub fn case_type_label(code: &str) -> &str {
    match code {
        "1" => "刑事",
        "2" => "民事",
        "3" => "行政",
        "4" => "赔偿",
        "5" => "执行",
        "6" => "知产",
        other => other,
    }
}

/// Combine a case-type code with the trial procedure into one label.
#[must_use]
pub fn normalize_case_type(code: &str, procedure: &str) -> String {
    let label = case_type_label(code);
    match procedure {
        "再审审查与审判监督" => format!("{label}, 审监"),
        "非诉执行审查" => format!("{label}, 非诉"),
        "刑罚变更" => String::new(),
        "执行" if label == "执行" => label.to_string(),
        "执行" => format!("{label}, 执行"),
        _ => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(normalize_case_type("1", "一审"), "刑事");
        assert_eq!(normalize_case_type("6", "二审"), "知产");
        assert_eq!(normalize_case_type("民事", "其他"), "民事");
        assert_eq!(normalize_case_type("9", "一审"), "9");
    }

    #[test]
    fn test_procedure_suffixes() {
        assert_eq!(normalize_case_type("2", "再审审查与审判监督"), "民事, 审监");
        assert_eq!(normalize_case_type("3", "非诉执行审查"), "行政, 非诉");
        assert_eq!(normalize_case_type("1", "刑罚变更"), "");
        assert_eq!(normalize_case_type("2", "执行"), "民事, 执行");
        assert_eq!(normalize_case_type("5", "执行"), "执行");
    }
}
