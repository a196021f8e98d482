//! Table and column allow-lists.
//!
//! Every identifier that reaches SQL text comes from this module. Column names
//! are logical and lowercase; the transaction table additionally maps the
//! logical `skill_id` onto its physical `client_id` column.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Tables the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    Contact,
    ContactDetails,
    Client,
    SkillXClient,
    Campaign,
    Transaction,
}

impl TableName {
    /// Logical table name as callers spell it.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::ContactDetails => "contact_details",
            Self::Client => "client",
            Self::SkillXClient => "skillxclient",
            Self::Campaign => "campaign",
            Self::Transaction => "transaction",
        }
    }

    /// Case-insensitive lookup of a caller-supplied table name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "contact" => Some(Self::Contact),
            "contact_details" => Some(Self::ContactDetails),
            "client" => Some(Self::Client),
            "skillxclient" => Some(Self::SkillXClient),
            "campaign" => Some(Self::Campaign),
            "transaction" => Some(Self::Transaction),
            _ => None,
        }
    }

    /// Allow-list entry for this table.
    pub fn spec(self) -> &'static TableSpec {
        match self {
            Self::Contact => &CONTACT,
            Self::ContactDetails => &CONTACT_DETAILS,
            Self::Client => &CLIENT,
            Self::SkillXClient => &SKILLXCLIENT,
            Self::Campaign => &CAMPAIGN,
            Self::Transaction => &TRANSACTION,
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement kind a table may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => f.write_str("select"),
            Self::Insert => f.write_str("insert"),
        }
    }
}

/// Where a table physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableHome {
    /// The primary PostgreSQL backend
    Primary,
    /// The configuration backend itself
    Configuration,
    /// A client's dialing database (through a link, or on the primary backend)
    Dialing,
}

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Columns of a table.
#[derive(Debug)]
pub enum ColumnSet {
    /// A fixed list
    Fixed(&'static [&'static str]),
    /// A fixed base plus numbered slot columns `prefix1..=prefixN`
    Slotted {
        base: &'static [&'static str],
        prefix: &'static str,
        slots: u16,
    },
}

impl ColumnSet {
    fn contains(&self, column: &str) -> bool {
        match self {
            Self::Fixed(columns) => columns.contains(&column),
            Self::Slotted {
                base,
                prefix,
                slots,
            } => {
                base.contains(&column)
                    || column
                        .strip_prefix(prefix)
                        .filter(|n| !n.starts_with('0'))
                        .and_then(|n| n.parse::<u16>().ok())
                        .is_some_and(|n| (1..=*slots).contains(&n))
            }
        }
    }

    /// Every column, in declaration order.
    pub fn all(&self) -> Vec<String> {
        match self {
            Self::Fixed(columns) => columns.iter().map(|c| (*c).to_string()).collect(),
            Self::Slotted {
                base,
                prefix,
                slots,
            } => base
                .iter()
                .map(|c| (*c).to_string())
                .chain((1..=*slots).map(|n| format!("{prefix}{n}")))
                .collect(),
        }
    }
}

/// Allow-list entry for one table.
#[derive(Debug)]
pub struct TableSpec {
    /// Logical name
    pub name: TableName,
    /// Schema and physical table name (before configuration overrides)
    pub physical: (&'static str, &'static str),
    /// Where the table lives
    pub home: TableHome,
    /// Readable columns
    pub columns: ColumnSet,
    /// Columns accepted in inserts; empty when inserts are not allowed
    pub insert_columns: &'static [&'static str],
    /// Primary key, appended to every ordering as a tiebreaker
    pub primary_key: &'static str,
    /// Ordering used when the caller gives none
    pub default_order: SortDirection,
    /// Logical to physical column renames
    pub aliases: &'static [(&'static str, &'static str)],
    /// Integer key and counter columns; text operands on these are bound
    /// as numbers
    pub numeric: &'static [&'static str],
}

impl TableSpec {
    /// True when `column` (lowercase) is readable on this table.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    /// True when the table accepts the operation.
    pub const fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Select => true,
            Operation::Insert => !self.insert_columns.is_empty(),
        }
    }

    /// True when `column` holds numbers.
    pub fn is_numeric(&self, column: &str) -> bool {
        self.numeric.contains(&column)
    }

    /// True when `column` may be written by an insert.
    pub fn is_insertable(&self, column: &str) -> bool {
        self.insert_columns.contains(&column)
    }

    /// Physical name of a logical column.
    pub fn physical_column<'a>(&self, column: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(logical, _)| *logical == column)
            .map_or(column, |(_, physical)| *physical)
    }

    /// Logical name of a physical column as returned by the backend.
    pub fn logical_column<'a>(&self, column: &'a str) -> &'a str {
        self.aliases
            .iter()
            .find(|(_, physical)| *physical == column)
            .map_or(column, |(logical, _)| *logical)
    }
}

fn qualified_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*\.[A-Za-z_][A-Za-z0-9_$]*$").ok())
        .as_ref()
}

/// True for a plain `schema.table` identifier.
pub fn is_valid_qualified_name(name: &str) -> bool {
    qualified_name_pattern().is_some_and(|re| re.is_match(name))
}

/// Mutation and schema keywords that may never appear in filter values or
/// column tokens.
pub const DISALLOWED_KEYWORDS: &[&str] = &[
    "DELETE", "UPDATE", "DROP", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE",
];

/// Accepted `am_option` values for campaigns.
pub const AM_OPTIONS: &[&str] = &["DONT_LEAVE_MESSAGES", "LEAVE_MESSAGES", "NO_AM"];

/// Accepted `contact_source` values for campaigns.
pub const CONTACT_SOURCES: &[&str] = &["CAMPAIGN", "CONTACT"];

const CONTACT_COLUMNS: &[&str] = &[
    "lvaccount_id", "client_id", "account", "b_active", "account_to_speak", "first_name",
    "last_name", "dob", "email_address", "ssn", "phone1", "phone2", "phone3", "phone4", "phone5",
    "phone6", "phone7", "phone8", "phone9", "phone10", "address1", "address2", "city", "state",
    "postalcode", "country_id", "guarantor_firstname", "guarantor_lastname", "paymentbalance",
    "amount_to_speak", "account_due_date", "callattemptstoday", "callattemptslifetime",
    "createdate", "createuser", "modifydate", "modifyuser", "initial_load_date",
    "initial_load_campaignid", "last_load_date", "last_load_campaignid", "do_not_dial",
    "do_not_dial_daily", "group_id", "original_account_number",
    "phone1_attempts_today", "phone1_attempts_lifetime", "phone1_dnd", "phone1_dnd_daily",
    "phone2_attempts_today", "phone2_attempts_lifetime", "phone2_dnd", "phone2_dnd_daily",
    "phone3_attempts_today", "phone3_attempts_lifetime", "phone3_dnd", "phone3_dnd_daily",
    "phone4_attempts_today", "phone4_attempts_lifetime", "phone4_dnd", "phone4_dnd_daily",
    "phone5_attempts_today", "phone5_attempts_lifetime", "phone5_dnd", "phone5_dnd_daily",
    "phone6_attempts_today", "phone6_attempts_lifetime", "phone6_dnd", "phone6_dnd_daily",
    "phone7_attempts_today", "phone7_attempts_lifetime", "phone7_dnd", "phone7_dnd_daily",
    "phone8_attempts_today", "phone8_attempts_lifetime", "phone8_dnd", "phone8_dnd_daily",
    "phone9_attempts_today", "phone9_attempts_lifetime", "phone9_dnd", "phone9_dnd_daily",
    "phone10_attempts_today", "phone10_attempts_lifetime", "phone10_dnd", "phone10_dnd_daily",
    "sms", "email",
    "phone1_sms_consent", "phone1_cell_consent", "phone2_sms_consent", "phone2_cell_consent",
    "phone3_sms_consent", "phone3_cell_consent", "phone4_sms_consent", "phone4_cell_consent",
    "phone5_sms_consent", "phone5_cell_consent", "phone6_sms_consent", "phone6_cell_consent",
    "phone7_sms_consent", "phone7_cell_consent", "phone8_sms_consent", "phone8_cell_consent",
    "phone9_sms_consent", "phone9_cell_consent", "phone10_sms_consent", "phone10_cell_consent",
    "primary_email_consent", "agent_id", "agent_team_id", "description", "department",
    "salutation", "title", "happiness_index", "happiness_trend", "happiness_ndx_updated",
];

const CONTACT_DETAILS_BASE: &[&str] = &["lvaccount_id", "client_id", "account"];

const CLIENT_COLUMNS: &[&str] = &["client_id", "dialing_db", "reporting_db"];

const SKILLXCLIENT_COLUMNS: &[&str] = &["skill_id", "client_id"];

const CAMPAIGN_INSERT_COLUMNS: &[&str] = &[
    "client_id", "filename", "start_time", "end_time", "leave_messages", "operator_phone",
    "callback_phone", "caller_id", "voice_id", "b_active", "skill_id", "dialing_strategy_id",
    "am_option", "campaign_type_id", "contact_source", "email_from", "campaign_subtype",
];

const CAMPAIGN_COLUMNS: &[&str] = &[
    "campaign_id", "create_date", "client_id", "filename", "start_time", "end_time",
    "leave_messages", "operator_phone", "callback_phone", "caller_id", "voice_id", "b_active",
    "skill_id", "dialing_strategy_id", "am_option", "campaign_type_id", "contact_source",
    "email_from", "campaign_subtype",
];

/// Logical transaction columns. `skill_id` is stored in the physical
/// `client_id` column.
const TRANSACTION_COLUMNS: &[&str] = &[
    "acct_transaction_id", "account", "patient_firstname", "patient_lastname",
    "guarantor_firstname", "guarantor_lastname", "patient_phone1", "patient_phone2",
    "patient_dob", "patient_email", "patient_ssn", "patient_first_id", "patient_second_id",
    "practice_id", "skill_id", "client_practice_id", "practice_phone",
    "practice_phone_alternate", "operator_phone", "place_of_service_id", "alt_language_1",
    "alt_language_2", "alt_language_3", "language_callback_1", "language_callback_2",
    "language_callback_3", "practice_fax", "insurance_type", "insurance_company", "template_id",
    "requeue_id", "last_payment_date", "total_amount", "minimum_payment_amount",
    "account_to_speak", "amount_to_speak", "discount_amount_to_speak",
    "discount_percentage_to_speak", "days_to_speak", "amount_1", "days_due_1", "amount_2",
    "days_due_2", "amount_3", "days_due_3", "amount_4", "days_due_4", "amount_5", "days_due_5",
    "amount_6", "days_due_6", "input_id_menu", "input_dynamic_menu_1", "input_dynamic_menu_2",
    "input_credit_card_number", "input_credit_card_exp_date", "input_approval_code",
    "input_payment_amount", "input_other_phone_number", "input_fax_phone_number", "input_ssn",
    "input_dob", "input_first_id", "input_second_id", "confirm_credit_card_number",
    "confirm_credit_card_exp_date", "confirm_approval_code", "confirm_payment_amount",
    "confirm_other_phone_number", "confirm_fax_phone_number", "confirm_first_id",
    "confirm_second_id", "language", "extra_1", "extra_2", "extra_3", "extra_4", "extra_5",
    "extra_6", "extra_7", "extra_8", "extra_9", "extra_10", "extra_11", "extra_12", "extra_13",
    "extra_14", "extra_15", "extra_16", "extra_17", "extra_18", "extra_19", "extra_20",
    "live_person", "machine", "not_available", "lead_1", "lead_2", "lead_3", "lead_4", "lead_5",
    "lead_6", "lead_credit_card_number", "lead_other_phone_number", "lead_other_fax_number",
    "no_input", "queued", "b_active", "transaction_update", "attempt", "call_start_time",
    "call_connect_time", "call_finish_time", "call_duration", "outcome", "result1", "result2",
    "tfh_result", "phone_dialed", "phone_update", "transfer_connect_time", "transfer_duration",
    "date_modified", "billing", "session_id", "campaign_id", "lvtransaction_type",
    "original_account_number", "chat_rating", "lvtransaction_subtype",
    "assigned_thread_owner_agent_id", "active_thread",
];

/// Columns copied when transactions are requeued into a new campaign: the
/// request half of a transaction. Call results, timings and the key are left
/// for the dialer to fill; `campaign_id` is written by the workflow.
pub const REQUEUE_COLUMNS: &[&str] = &[
    "account", "patient_firstname", "patient_lastname", "guarantor_firstname",
    "guarantor_lastname", "patient_phone1", "patient_phone2", "patient_dob", "patient_email",
    "patient_ssn", "patient_first_id", "patient_second_id", "practice_id", "skill_id",
    "client_practice_id", "practice_phone", "practice_phone_alternate", "operator_phone",
    "place_of_service_id", "alt_language_1", "alt_language_2", "alt_language_3",
    "language_callback_1", "language_callback_2", "language_callback_3", "practice_fax",
    "insurance_type", "insurance_company", "template_id", "requeue_id", "last_payment_date",
    "total_amount", "minimum_payment_amount", "account_to_speak", "amount_to_speak",
    "discount_amount_to_speak", "discount_percentage_to_speak", "days_to_speak", "amount_1",
    "days_due_1", "amount_2", "days_due_2", "amount_3", "days_due_3", "amount_4", "days_due_4",
    "amount_5", "days_due_5", "amount_6", "days_due_6", "language", "extra_1", "extra_2",
    "extra_3", "extra_4", "extra_5", "extra_6", "extra_7", "extra_8", "extra_9", "extra_10",
    "extra_11", "extra_12", "extra_13", "extra_14", "extra_15", "extra_16", "extra_17",
    "extra_18", "extra_19", "extra_20", "b_active", "lvtransaction_type",
    "original_account_number", "lvtransaction_subtype",
];

const TRANSACTION_INSERT_COLUMNS: &[&str] = &[
    "account", "patient_firstname", "patient_lastname", "guarantor_firstname",
    "guarantor_lastname", "patient_phone1", "patient_phone2", "patient_dob", "patient_email",
    "patient_ssn", "patient_first_id", "patient_second_id", "practice_id", "skill_id",
    "client_practice_id", "practice_phone", "practice_phone_alternate", "operator_phone",
    "place_of_service_id", "alt_language_1", "alt_language_2", "alt_language_3",
    "language_callback_1", "language_callback_2", "language_callback_3", "practice_fax",
    "insurance_type", "insurance_company", "template_id", "requeue_id", "last_payment_date",
    "total_amount", "minimum_payment_amount", "account_to_speak", "amount_to_speak",
    "discount_amount_to_speak", "discount_percentage_to_speak", "days_to_speak", "amount_1",
    "days_due_1", "amount_2", "days_due_2", "amount_3", "days_due_3", "amount_4", "days_due_4",
    "amount_5", "days_due_5", "amount_6", "days_due_6", "language", "extra_1", "extra_2",
    "extra_3", "extra_4", "extra_5", "extra_6", "extra_7", "extra_8", "extra_9", "extra_10",
    "extra_11", "extra_12", "extra_13", "extra_14", "extra_15", "extra_16", "extra_17",
    "extra_18", "extra_19", "extra_20", "b_active", "lvtransaction_type",
    "original_account_number", "lvtransaction_subtype", "campaign_id",
];

static CONTACT: TableSpec = TableSpec {
    name: TableName::Contact,
    physical: ("lvousr", "contact"),
    home: TableHome::Primary,
    columns: ColumnSet::Fixed(CONTACT_COLUMNS),
    insert_columns: &[],
    primary_key: "lvaccount_id",
    default_order: SortDirection::Asc,
    aliases: &[],
    numeric: &[
        "lvaccount_id", "client_id", "group_id", "callattemptstoday", "callattemptslifetime",
        "initial_load_campaignid", "last_load_campaignid",
    ],
};

static CONTACT_DETAILS: TableSpec = TableSpec {
    name: TableName::ContactDetails,
    physical: ("lvousr", "contact_details"),
    home: TableHome::Primary,
    columns: ColumnSet::Slotted {
        base: CONTACT_DETAILS_BASE,
        prefix: "col",
        slots: 100,
    },
    insert_columns: &[],
    primary_key: "lvaccount_id",
    default_order: SortDirection::Asc,
    aliases: &[],
    numeric: &["lvaccount_id", "client_id"],
};

static CLIENT: TableSpec = TableSpec {
    name: TableName::Client,
    physical: ("lvousr", "client"),
    home: TableHome::Configuration,
    columns: ColumnSet::Fixed(CLIENT_COLUMNS),
    insert_columns: &[],
    primary_key: "client_id",
    default_order: SortDirection::Asc,
    aliases: &[],
    numeric: &["client_id"],
};

static SKILLXCLIENT: TableSpec = TableSpec {
    name: TableName::SkillXClient,
    physical: ("lvousr", "skillxclient"),
    home: TableHome::Configuration,
    columns: ColumnSet::Fixed(SKILLXCLIENT_COLUMNS),
    insert_columns: &[],
    primary_key: "skill_id",
    default_order: SortDirection::Asc,
    aliases: &[],
    numeric: &["skill_id", "client_id"],
};

static CAMPAIGN: TableSpec = TableSpec {
    name: TableName::Campaign,
    physical: ("lvousr", "campaign"),
    home: TableHome::Configuration,
    columns: ColumnSet::Fixed(CAMPAIGN_COLUMNS),
    insert_columns: CAMPAIGN_INSERT_COLUMNS,
    primary_key: "campaign_id",
    default_order: SortDirection::Desc,
    aliases: &[],
    numeric: &[
        "campaign_id", "client_id", "skill_id", "dialing_strategy_id", "campaign_type_id",
    ],
};

static TRANSACTION: TableSpec = TableSpec {
    name: TableName::Transaction,
    physical: ("lvousr", "transaction"),
    home: TableHome::Dialing,
    columns: ColumnSet::Fixed(TRANSACTION_COLUMNS),
    insert_columns: TRANSACTION_INSERT_COLUMNS,
    primary_key: "acct_transaction_id",
    default_order: SortDirection::Desc,
    aliases: &[("skill_id", "client_id")],
    numeric: &[
        "acct_transaction_id", "skill_id", "campaign_id", "requeue_id", "template_id", "attempt",
        "call_duration", "transfer_duration",
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_parse() {
        assert_eq!(TableName::parse("Contact"), Some(TableName::Contact));
        assert_eq!(
            TableName::parse("contact_details"),
            Some(TableName::ContactDetails)
        );
        assert_eq!(TableName::parse("users"), None);
        assert_eq!(TableName::parse("contact;--"), None);
    }

    #[test]
    fn test_numeric_columns() {
        let contact = TableName::Contact.spec();
        assert!(contact.is_numeric("lvaccount_id"));
        assert!(!contact.is_numeric("account"));
        assert!(TableName::Transaction.spec().is_numeric("skill_id"));
        assert!(!TableName::Transaction.spec().is_numeric("outcome"));
    }

    #[test]
    fn test_contact_details_slots() {
        let spec = TableName::ContactDetails.spec();
        assert!(spec.has_column("col1"));
        assert!(spec.has_column("col100"));
        assert!(spec.has_column("account"));
        assert!(!spec.has_column("col0"));
        assert!(!spec.has_column("col101"));
        assert!(!spec.has_column("col01"));
        assert!(!spec.has_column("colx"));
    }

    #[test]
    fn test_transaction_skill_alias() {
        let spec = TableName::Transaction.spec();
        assert!(spec.has_column("skill_id"));
        assert!(!spec.has_column("client_id"));
        assert_eq!(spec.physical_column("skill_id"), "client_id");
        assert_eq!(spec.physical_column("outcome"), "outcome");
        assert_eq!(spec.logical_column("client_id"), "skill_id");
    }

    #[test]
    fn test_insert_allow_list() {
        assert!(TableName::Campaign.spec().allows(Operation::Insert));
        assert!(TableName::Transaction.spec().allows(Operation::Insert));
        assert!(!TableName::Contact.spec().allows(Operation::Insert));
        assert!(!TableName::Client.spec().allows(Operation::Insert));
    }

    #[test]
    fn test_requeue_columns_are_insertable() {
        let spec = TableName::Transaction.spec();
        for column in REQUEUE_COLUMNS {
            assert!(spec.is_insertable(column), "{column} not insertable");
            assert!(spec.has_column(column), "{column} not readable");
        }
    }

    #[test]
    fn test_qualified_name() {
        assert!(is_valid_qualified_name("lvousr.contact"));
        assert!(!is_valid_qualified_name("contact"));
        assert!(!is_valid_qualified_name("lvousr.contact@link"));
        assert!(!is_valid_qualified_name("a.b.c"));
    }
}
