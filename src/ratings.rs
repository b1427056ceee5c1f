//! Closed rating families and their lenient coercions.
//!
//! Each family is a closed enum with one designated default member. Tags are
//! the identifiers the model is asked to return; they look ordinal but carry
//! no magnitude, so none of these types implement `Ord`.
//!
//! Two coercions exist per family:
//!
//! - `from_string`: strict tag lookup composed with an infallible default.
//! - `extract_fallback`: ordered keyword scan over free text. The first
//!   trigger found wins, so trigger order is part of the contract.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared behavior of every rating family.
pub trait Rating: Copy + Eq + fmt::Debug + 'static {
    /// Family label used in logs and result columns.
    const FAMILY: &'static str;
    /// Member used whenever classification cannot be determined.
    const DEFAULT: Self;
    /// Every member, in declaration order.
    const ALL: &'static [Self];
    /// Ordered `(phrase, member)` keyword triggers.
    const TRIGGERS: &'static [(&'static str, Self)];
    /// Extra tags accepted on input but never offered to the model.
    const ALIASES: &'static [(&'static str, Self)] = &[];

    /// Identifier the model returns for this member.
    fn tag(self) -> &'static str;

    /// Stable upper-case member name written to result tables.
    fn name(self) -> &'static str;

    /// Strict lookup by tag, then by alias.
    fn from_tag(raw: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|member| member.tag() == raw)
            .or_else(|| {
                Self::ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == raw)
                    .map(|(_, member)| *member)
            })
    }

    /// Total conversion: unknown input maps to the default member.
    fn from_string(raw: &str) -> Self {
        match Self::from_tag(raw) {
            Some(member) => member,
            None => {
                tracing::warn!(
                    family = Self::FAMILY,
                    value = raw,
                    default = Self::DEFAULT.name(),
                    "invalid rating value; using default"
                );
                Self::DEFAULT
            }
        }
    }

    /// Keyword classification of free text.
    fn extract_fallback(text: &str) -> Self {
        let lowered = text.to_lowercase();
        Self::TRIGGERS
            .iter()
            .find(|(phrase, _)| lowered.contains(phrase))
            .map(|(_, member)| *member)
            .unwrap_or(Self::DEFAULT)
    }
}

macro_rules! rating_family {
    (
        $(#[$meta:meta])*
        $ty:ident, family = $family:literal, default = $default:ident,
        members { $($variant:ident => ($tag:literal, $name:literal)),+ $(,)? },
        $(aliases { $($alias:literal => $aliased:ident),+ $(,)? },)?
        triggers { $($phrase:literal => $hit:ident),* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $ty {
            $($variant,)+
        }

        impl Rating for $ty {
            const FAMILY: &'static str = $family;
            const DEFAULT: Self = Self::$default;
            const ALL: &'static [Self] = &[$(Self::$variant,)+];
            const TRIGGERS: &'static [(&'static str, Self)] = &[$(($phrase, Self::$hit),)*];
            $(const ALIASES: &'static [(&'static str, Self)] = &[$(($alias, Self::$aliased),)+];)?

            fn tag(self) -> &'static str {
                match self {
                    $(Self::$variant => $tag,)+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

rating_family! {
    /// Sensitivity tier of a permission.
    RiskRating, family = "risk", default = General,
    members {
        MissionCritical => ("5", "MISSION_CRITICAL"),
        Restricted => ("4", "RESTRICTED"),
        Sensitive => ("3", "SENSITIVE"),
        Controlled => ("2", "CONTROLLED"),
        General => ("1", "GENERAL"),
    },
    triggers {
        "mission critical" => MissionCritical,
        "mission-critical" => MissionCritical,
        "restricted" => Restricted,
        "sensitive" => Sensitive,
        "controlled" => Controlled,
    }
}

rating_family! {
    /// Quality of a permission's published description.
    QualityRating, family = "quality", default = Unknown,
    members {
        PerfectQuality => ("5", "PERFECT_QUALITY"),
        HighQuality => ("4", "HIGH_QUALITY"),
        ModerateQuality => ("3", "MODERATE_QUALITY"),
        LowQuality => ("2", "LOW_QUALITY"),
        NoQuality => ("1", "NO_QUALITY"),
        Unknown => ("99", "UNKNOWN"),
    },
    triggers {
        "perfect quality" => PerfectQuality,
        "perfect_quality" => PerfectQuality,
        "high quality" => HighQuality,
        "high_quality" => HighQuality,
        "moderate quality" => ModerateQuality,
        "moderate_quality" => ModerateQuality,
        "low quality" => LowQuality,
        "low_quality" => LowQuality,
        "no quality" => NoQuality,
        "no_quality" => NoQuality,
    }
}

rating_family! {
    /// How strongly a permission matches its assigned category or cloud.
    MatchStrength, family = "match", default = Unknown,
    members {
        ExactMatch => ("5", "EXACT_MATCH"),
        HighMatch => ("4", "HIGH_MATCH"),
        ModerateMatch => ("3", "MODERATE_MATCH"),
        LowMatch => ("2", "LOW_MATCH"),
        NoMatch => ("1", "NO_MATCH"),
        Unknown => ("0", "UNKNOWN"),
    },
    aliases {
        // Cloud prompts historically used 99 for "cannot tell".
        "99" => Unknown,
    },
    triggers {
        "exact match" => ExactMatch,
        "exact-match" => ExactMatch,
        "exact_match" => ExactMatch,
        "high match" => HighMatch,
        "high-match" => HighMatch,
        "high_match" => HighMatch,
        "moderate match" => ModerateMatch,
        "moderate-match" => ModerateMatch,
        "moderate_match" => ModerateMatch,
        "low match" => LowMatch,
        "low-match" => LowMatch,
        "low_match" => LowMatch,
        "no match" => NoMatch,
        "no-match" => NoMatch,
        "no_match" => NoMatch,
    }
}

rating_family! {
    /// Functional area a permission belongs to.
    CategoryLabel, family = "category", default = Unknown,
    members {
        GeneralAdmin => ("1", "GENERAL_ADMIN"),
        SecurityAdmin => ("2", "SECURITY_ADMIN"),
        UserManagement => ("3", "USER_MANAGEMENT"),
        DataAdmin => ("4", "DATA_ADMIN"),
        ImportAndExport => ("5", "IMPORT_AND_EXPORT"),
        AgentforceAndEinstein => ("6", "AGENTFORCE_AND_EINSTEIN"),
        ReportAndDashboard => ("7", "REPORT_AND_DASHBOARD"),
        Developer => ("8", "DEVELOPER"),
        UserInterface => ("9", "USER_INTERFACE"),
        Object => ("10", "OBJECT"),
        ShieldAndEventMonitoring => ("11", "SHIELD_AND_EVENT_MONITORING"),
        ChatterAndCommunities => ("12", "CHATTER_AND_COMMUNITIES"),
        DataCloud => ("13", "DATA_CLOUD"),
        CrmAnalytics => ("14", "CRM_ANALYTICS"),
        SlackAndQuip => ("15", "SLACK_AND_QUIP"),
        Commerce => ("16", "COMMERCE"),
        FieldService => ("17", "FIELD_SERVICE"),
        MarketingCloudAndPardot => ("18", "MARKETING_CLOUD_AND_PARDOT"),
        Cpq => ("19", "CPQ"),
        IndustryCloud => ("20", "INDUSTRY_CLOUD"),
        Unknown => ("0", "UNKNOWN"),
    },
    triggers {
        "general admin" => GeneralAdmin,
        "general-admin" => GeneralAdmin,
        "security admin" => SecurityAdmin,
        "security-admin" => SecurityAdmin,
        "user management" => UserManagement,
        "user-management" => UserManagement,
        "data admin" => DataAdmin,
        "data-admin" => DataAdmin,
        "import and export" => ImportAndExport,
        "import-and-export" => ImportAndExport,
        "agentforce and einstein" => AgentforceAndEinstein,
        "agentforce-and-einstein" => AgentforceAndEinstein,
        "report and dashboard" => ReportAndDashboard,
        "report-and-dashboard" => ReportAndDashboard,
        "developer" => Developer,
        "user interface" => UserInterface,
        "user-interface" => UserInterface,
        "object" => Object,
        "shield and event monitoring" => ShieldAndEventMonitoring,
        "shield-and-event-monitoring" => ShieldAndEventMonitoring,
        "chatter and communities" => ChatterAndCommunities,
        "chatter-and-communities" => ChatterAndCommunities,
        "data cloud" => DataCloud,
        "data-cloud" => DataCloud,
        "crm analytics" => CrmAnalytics,
        "crm-analytics" => CrmAnalytics,
        "slack and quip" => SlackAndQuip,
        "slack-and-quip" => SlackAndQuip,
        "commerce" => Commerce,
        "field service" => FieldService,
        "field-service" => FieldService,
        "marketing cloud and pardot" => MarketingCloudAndPardot,
        "marketing-cloud-and-pardot" => MarketingCloudAndPardot,
        "cpq" => Cpq,
        "industry cloud" => IndustryCloud,
        "industry-cloud" => IndustryCloud,
    }
}

rating_family! {
    /// Salesforce cloud, add-on, or industry product a permission ships with.
    CloudLabel, family = "cloud", default = Unknown,
    members {
        SalesCloud => ("1", "SALES_CLOUD"),
        ServiceCloud => ("2", "SERVICE_CLOUD"),
        MarketingCloudAndPardot => ("3", "MARKETING_CLOUD_AND_PARDOT"),
        CommerceCloud => ("4", "COMMERCE_CLOUD"),
        SlackAndQuip => ("5", "SLACK_AND_QUIP"),
        Cpq => ("6", "CPQ"),
        FieldService => ("7", "FIELD_SERVICE"),
        FinancialServicesCloud => ("8", "FINANCIAL_SERVICES_CLOUD"),
        HealthcareAndLifeSciencesCloud => ("9", "HEALTHCARE_AND_LIFE_SCIENCES_CLOUD"),
        ConsumerGoodsCloud => ("10", "CONSUMER_GOODS_CLOUD"),
        CommunicationsCloud => ("11", "COMMUNICATIONS_CLOUD"),
        ManufacturingCloud => ("12", "MANUFACTURING_CLOUD"),
        NonprofitCloud => ("13", "NONPROFIT_CLOUD"),
        GeneralIndustriesCloud => ("14", "GENERAL_INDUSTRIES_CLOUD"),
        Unknown => ("99", "UNKNOWN"),
    },
    triggers {
        "sales cloud" => SalesCloud,
        "sales_cloud" => SalesCloud,
        "service cloud" => ServiceCloud,
        "service_cloud" => ServiceCloud,
        "marketing cloud and pardot" => MarketingCloudAndPardot,
        "marketing_cloud_and_pardot" => MarketingCloudAndPardot,
        "commerce cloud" => CommerceCloud,
        "commerce_cloud" => CommerceCloud,
        "slack and quip" => SlackAndQuip,
        "slack_and_quip" => SlackAndQuip,
        "cpq" => Cpq,
        "field service" => FieldService,
        "field_service" => FieldService,
        "financial services cloud" => FinancialServicesCloud,
        "financial_services_cloud" => FinancialServicesCloud,
        "healthcare & life sciences cloud" => HealthcareAndLifeSciencesCloud,
        "healthcare_and_life_sciences_cloud" => HealthcareAndLifeSciencesCloud,
        "consumer goods cloud" => ConsumerGoodsCloud,
        "consumer_goods_cloud" => ConsumerGoodsCloud,
        "communications cloud" => CommunicationsCloud,
        "communications_cloud" => CommunicationsCloud,
        "manufacturing cloud" => ManufacturingCloud,
        "manufacturing_cloud" => ManufacturingCloud,
        "nonprofit cloud" => NonprofitCloud,
        "nonprofit_cloud" => NonprofitCloud,
        "general industries cloud" => GeneralIndustriesCloud,
        "general_industries_cloud" => GeneralIndustriesCloud,
    }
}

/// Runtime handle for a rating family, used where the family is chosen by
/// the evaluation dimension rather than at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingFamily {
    Risk,
    Quality,
    Match,
    CategoryLabel,
    CloudLabel,
}

/// A coerced rating detached from its concrete enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingValue {
    pub family: RatingFamily,
    pub tag: &'static str,
    pub name: &'static str,
}

/// How a rating was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingSource {
    /// The model returned a legal tag for the constrained follow-up turn.
    Structured,
    /// Keyword scan over the free-text rationale.
    Fallback,
}

impl fmt::Display for RatingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

macro_rules! with_rating_type {
    ($family:expr, $r:ident => $body:expr) => {
        match $family {
            RatingFamily::Risk => {
                type $r = RiskRating;
                $body
            }
            RatingFamily::Quality => {
                type $r = QualityRating;
                $body
            }
            RatingFamily::Match => {
                type $r = MatchStrength;
                $body
            }
            RatingFamily::CategoryLabel => {
                type $r = CategoryLabel;
                $body
            }
            RatingFamily::CloudLabel => {
                type $r = CloudLabel;
                $body
            }
        }
    };
}

impl RatingFamily {
    pub fn label(self) -> &'static str {
        with_rating_type!(self, R => R::FAMILY)
    }

    /// Legal tags, in declaration order.
    pub fn tags(self) -> Vec<&'static str> {
        with_rating_type!(self, R => R::ALL.iter().map(|member| member.tag()).collect())
    }

    pub fn from_tag(self, raw: &str) -> Option<RatingValue> {
        with_rating_type!(self, R => R::from_tag(raw).map(|member| self.value(member)))
    }

    pub fn from_string(self, raw: &str) -> RatingValue {
        with_rating_type!(self, R => self.value(R::from_string(raw)))
    }

    pub fn fallback(self, text: &str) -> RatingValue {
        with_rating_type!(self, R => self.value(R::extract_fallback(text)))
    }

    fn value<R: Rating>(self, member: R) -> RatingValue {
        RatingValue {
            family: self,
            tag: member.tag(),
            name: member.name(),
        }
    }
}

impl fmt::Display for RatingFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
#[path = "ratings_tests.rs"]
mod tests;
