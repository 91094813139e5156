use super::rule::Rule;
use crate::error::Result;
use crate::warden_error;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_RULES_JSON: &str = include_str!("default_rules.json");

/// Хранилище правил: загрузка и сохранение списка правил
pub trait RuleStore: Send + Sync {
    fn load(&self) -> Result<Vec<Rule>>;
    fn save(&self, rules: &[Rule]) -> Result<()>;
}

/// Правила в JSON-файле (массив записей)
pub struct JsonRuleStore {
    path: PathBuf,
}

impl JsonRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RuleStore for JsonRuleStore {
    fn load(&self) -> Result<Vec<Rule>> {
        if !self.path.exists() {
            info!("Файл правил {:?} не найден, используются правила по умолчанию", self.path);
            return default_rules();
        }

        let content = std::fs::read_to_string(&self.path)?;
        let rules = parse_rules(&content)?;
        info!("Загружено {} правил из {:?}", rules.len(), self.path);
        Ok(rules)
    }

    fn save(&self, rules: &[Rule]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(rules)?;
        std::fs::write(&self.path, json)?;
        info!("Сохранено {} правил в {:?}", rules.len(), self.path);
        Ok(())
    }
}

/// Встроенный набор правил
pub fn default_rules() -> Result<Vec<Rule>> {
    parse_rules(DEFAULT_RULES_JSON)
}

/// Разбирает JSON-массив правил.
///
/// Некорректные записи (нет обязательного поля, неизвестный тип события или
/// действия, ошибка в регулярном выражении, повтор имени) пропускаются с
/// предупреждением. Ошибкой считается только документ, не являющийся массивом.
pub fn parse_rules(json: &str) -> Result<Vec<Rule>> {
    let document: serde_json::Value = serde_json::from_str(json)?;
    let serde_json::Value::Array(records) = document else {
        return Err(warden_error!(
            invalid_rule_file,
            "ожидался массив правил, получено: {}",
            json_kind(&document)
        ));
    };

    let mut names = HashSet::new();
    let mut rules = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        let rule: Rule = match serde_json::from_value(record) {
            Ok(rule) => rule,
            Err(e) => {
                warn!("Правило #{} пропущено: {}", index + 1, e);
                continue;
            }
        };

        if rule.name.trim().is_empty() {
            warn!("Правило #{} пропущено: пустое имя", index + 1);
            continue;
        }

        if !names.insert(rule.name.clone()) {
            warn!("Правило #{} пропущено: имя '{}' уже используется", index + 1, rule.name);
            continue;
        }

        rules.push(rule);
    }

    Ok(rules)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::rules::ActionKind;

    #[test]
    fn test_default_rules_parse() {
        let rules = default_rules().unwrap();
        assert_eq!(rules.len(), 6);
        for rule in &rules[..5] {
            assert_eq!(rule.action.kind, ActionKind::CloseDuplicatePath);
            assert!(rule.enabled);
        }
        assert!(!rules[5].enabled);
    }

    #[test]
    fn test_default_duplicate_rules_use_file_browser_classes() {
        let classes = crate::config::Config::default().windows.file_browser_classes;
        let rules = default_rules().unwrap();
        let triggered: Vec<&str> = rules
            .iter()
            .filter(|r| r.action.kind == ActionKind::CloseDuplicatePath)
            .filter_map(|r| r.trigger.window_class.as_deref())
            .collect();

        assert!(triggered.contains(&"Thunar"));
        assert!(triggered.contains(&"Org.gnome.Nautilus"));
        assert!(triggered.iter().all(|class| classes.iter().any(|c| c == class)));
    }

    #[test]
    fn test_malformed_records_are_dropped() {
        let json = r#"[
            {"name": "ok", "enabled": true, "priority": 5,
             "trigger": {"event_type": "CREATE"}, "action": {"type": "CLOSE_WINDOW"}},
            {"name": "unknown action", "enabled": true,
             "trigger": {"event_type": "CREATE"}, "action": {"type": "EXPLODE_WINDOW"}},
            {"name": "unknown event", "enabled": true,
             "trigger": {"event_type": "RESIZE"}, "action": {"type": "CLOSE_WINDOW"}},
            {"name": "no trigger", "enabled": true, "action": {"type": "CLOSE_WINDOW"}},
            {"name": "bad regex", "enabled": true,
             "trigger": {"event_type": "CREATE", "title_pattern": "[z-a]"}, "action": {"type": "HIDE_WINDOW"}},
            {"name": "ok", "enabled": false,
             "trigger": {"event_type": "DESTROY"}, "action": {"type": "HIDE_WINDOW"}},
            42
        ]"#;

        let rules = parse_rules(json).unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "ok");
        assert_eq!(rules[0].priority, 5);
        assert_eq!(rules[0].trigger.event_type, EventKind::Created);
    }

    #[test]
    fn test_missing_priority_defaults_to_fifty() {
        let json = r#"[{"name": "p", "enabled": true,
            "trigger": {"event_type": "FOREGROUND"}, "action": {"type": "BRING_TO_FOREGROUND"}}]"#;
        let rules = parse_rules(json).unwrap();
        assert_eq!(rules[0].priority, 50);
        assert_eq!(rules[0].description, "");
    }

    #[test]
    fn test_non_array_document_is_an_error() {
        assert!(parse_rules(r#"{"name": "x"}"#).is_err());
        assert!(parse_rules("not json").is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRuleStore::new(dir.path().join("nested").join("rules.json"));
        let rules = default_rules().unwrap();

        store.save(&rules).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, rules);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRuleStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().unwrap(), default_rules().unwrap());
    }
}
