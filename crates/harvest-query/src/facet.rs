//! Search facets and their fixed vocabularies.

use serde::{Deserialize, Serialize};
use std::fmt;

const CASE_TYPES: &[&str] = &["刑事案件", "民事案件", "行政案件", "赔偿案件", "执行案件"];

const DOCUMENT_TYPES: &[&str] = &[
    "判决书", "裁定书", "调解书", "决定书", "通知书", "批复", "答复", "函", "令", "其他",
];

const TRIAL_PROCEDURES: &[&str] = &[
    "一审",
    "二审",
    "再审",
    "复核",
    "刑罚变更",
    "非诉执行审查",
    "再审审查与审判监督",
    "其他",
];

const JUDGE_YEARS: &[&str] = &[
    "1996", "1997", "1998", "1999", "2000", "2001", "2002", "2003", "2004", "2005", "2006", "2007",
    "2008", "2009", "2010", "2011", "2012", "2013", "2014", "2015", "2016", "2017", "2018", "2019",
];

const COURT_TIERS: &[&str] = &["最高法院", "高级法院", "中级法院", "基层法院"];

const PROVINCES: &[&str] = &[
    "北京市",
    "天津市",
    "河北省",
    "山西省",
    "内蒙古自治区",
    "辽宁省",
    "吉林省",
    "黑龙江省",
    "上海市",
    "江苏省",
    "浙江省",
    "安徽省",
    "福建省",
    "江西省",
    "山东省",
    "河南省",
    "湖北省",
    "湖南省",
    "广东省",
    "广西壮族自治区",
    "海南省",
    "重庆市",
    "四川省",
    "贵州省",
    "云南省",
    "西藏自治区",
    "陕西省",
    "甘肃省",
    "青海省",
    "宁夏回族自治区",
    "新疆维吾尔自治区",
];

/// A named search constraint understood by the list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Facet {
    /// 案件类型
    CaseType,
    /// 文书类型
    DocumentType,
    /// 审判程序
    TrialProcedure,
    /// 裁判年份
    JudgeYear,
    /// 法院层级
    CourtTier,
    /// 法院地域
    Province,
    /// 全文检索
    FullText,
    /// 案号
    CaseNumber,
}

/// Order in which facets are added when a query is too broad.
pub const SUBDIVISION_ORDER: [Facet; 6] = [
    Facet::DocumentType,
    Facet::TrialProcedure,
    Facet::CaseType,
    Facet::JudgeYear,
    Facet::CourtTier,
    Facet::Province,
];

impl Facet {
    const ALL: [Facet; 8] = [
        Facet::CaseType,
        Facet::DocumentType,
        Facet::TrialProcedure,
        Facet::JudgeYear,
        Facet::CourtTier,
        Facet::Province,
        Facet::FullText,
        Facet::CaseNumber,
    ];

    /// Name used on the wire.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CaseType => "案件类型",
            Self::DocumentType => "文书类型",
            Self::TrialProcedure => "审判程序",
            Self::JudgeYear => "裁判年份",
            Self::CourtTier => "法院层级",
            Self::Province => "法院地域",
            Self::FullText => "全文检索",
            Self::CaseNumber => "案号",
        }
    }

    /// Look a facet up by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Every value the facet can take. Free-text facets have none.
    #[must_use]
    pub fn vocabulary(self) -> &'static [&'static str] {
        match self {
            Self::CaseType => CASE_TYPES,
            Self::DocumentType => DOCUMENT_TYPES,
            Self::TrialProcedure => TRIAL_PROCEDURES,
            Self::JudgeYear => JUDGE_YEARS,
            Self::CourtTier => COURT_TIERS,
            Self::Province => PROVINCES,
            Self::FullText | Self::CaseNumber => &[],
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
