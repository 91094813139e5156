pub mod rule;
pub mod store;

pub use rule::{enabled_by_priority, Action, ActionKind, Rule, TitlePattern, Trigger};
pub use store::{default_rules, parse_rules, JsonRuleStore, RuleStore};
