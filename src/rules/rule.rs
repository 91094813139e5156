use crate::events::{EventKind, WindowInfo};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Регулярное выражение для заголовка окна; некорректный шаблон отвергается при разборе.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TitlePattern(Regex);

impl TitlePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Поиск подстроки, а не совпадение всей строки
    pub fn is_match(&self, title: &str) -> bool {
        self.0.is_match(title)
    }
}

impl TryFrom<String> for TitlePattern {
    type Error = regex::Error;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::new(&pattern)
    }
}

impl From<TitlePattern> for String {
    fn from(pattern: TitlePattern) -> Self {
        pattern.0.as_str().to_string()
    }
}

impl PartialEq for TitlePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for TitlePattern {}

/// Условие срабатывания правила
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub event_type: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_pattern: Option<TitlePattern>,
}

impl Trigger {
    pub fn on(event_type: EventKind) -> Self {
        Self {
            event_type,
            executable_name: None,
            window_class: None,
            title_pattern: None,
        }
    }

    pub fn with_executable(mut self, name: impl Into<String>) -> Self {
        self.executable_name = Some(name.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.window_class = Some(class.into());
        self
    }

    pub fn with_title_pattern(mut self, pattern: TitlePattern) -> Self {
        self.title_pattern = Some(pattern);
        self
    }

    /// Чистая функция от (тип события, окно): без обращений к системе.
    pub fn matches(&self, kind: EventKind, window: &WindowInfo) -> bool {
        if self.event_type != kind {
            return false;
        }

        if let Some(expected) = &self.executable_name {
            // Окно без известного пути никогда не совпадает
            match window.executable_name() {
                Some(actual) if actual == expected.to_lowercase() => {}
                _ => return false,
            }
        }

        if let Some(expected) = &self.window_class {
            if window.class != *expected {
                return false;
            }
        }

        if let Some(pattern) = &self.title_pattern {
            if !pattern.is_match(&window.title) {
                return false;
            }
        }

        true
    }
}

/// Действие правила. Неизвестное имя не разбирается, поэтому до диспетчера не доходит.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "MINIMIZE_OTHERS_OF_SAME_APP")]
    MinimizeOthersOfSameApp,
    #[serde(rename = "CLOSE_DUPLICATE_PATH")]
    CloseDuplicatePath,
    #[serde(rename = "BRING_TO_FOREGROUND")]
    BringToForeground,
    #[serde(rename = "CLOSE_WINDOW")]
    CloseWindow,
    #[serde(rename = "HIDE_WINDOW")]
    HideWindow,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::MinimizeOthersOfSameApp => "MINIMIZE_OTHERS_OF_SAME_APP",
            ActionKind::CloseDuplicatePath => "CLOSE_DUPLICATE_PATH",
            ActionKind::BringToForeground => "BRING_TO_FOREGROUND",
            ActionKind::CloseWindow => "CLOSE_WINDOW",
            ActionKind::HideWindow => "HIDE_WINDOW",
        };
        f.write_str(name)
    }
}

/// Действие и фильтр целевых окон
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub exclude_trigger_window: bool,
    /// Только видимые окна
    #[serde(default, rename = "is_visible")]
    pub require_visible: bool,
    /// Только окна верхнего уровня
    #[serde(default, rename = "is_top_level")]
    pub require_top_level: bool,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            exclude_trigger_window: false,
            require_visible: false,
            require_top_level: false,
        }
    }

    pub fn excluding_trigger(mut self) -> Self {
        self.exclude_trigger_window = true;
        self
    }

    pub fn visible_top_level_only(mut self) -> Self {
        self.require_visible = true;
        self.require_top_level = true;
        self
    }

    pub fn accepts_target(&self, window: &WindowInfo) -> bool {
        (!self.require_visible || window.is_visible)
            && (!self.require_top_level || window.is_top_level)
    }
}

fn default_priority() -> i32 {
    50
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub trigger: Trigger,
    pub action: Action,
}

impl Rule {
    pub fn new(name: impl Into<String>, trigger: Trigger, action: Action) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            priority: default_priority(),
            trigger,
            action,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Включённые правила по убыванию приоритета; при равном приоритете сохраняется исходный порядок.
pub fn enabled_by_priority(rules: &[Rule]) -> Vec<&Rule> {
    let mut enabled: Vec<&Rule> = rules.iter().filter(|rule| rule.enabled).collect();
    // sort_by_key стабильна
    enabled.sort_by_key(|rule| std::cmp::Reverse(rule.priority));
    enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WindowHandle;

    fn notepad() -> WindowInfo {
        WindowInfo::new(WindowHandle(1), "Untitled - Notepad")
            .with_class("Notepad")
            .with_executable(r"C:\Windows\System32\notepad.exe")
    }

    #[test]
    fn test_trigger_requires_exact_event_kind() {
        let trigger = Trigger::on(EventKind::Created);
        assert!(trigger.matches(EventKind::Created, &notepad()));
        assert!(!trigger.matches(EventKind::NameChanged, &notepad()));
    }

    #[test]
    fn test_executable_name_is_case_insensitive() {
        let trigger = Trigger::on(EventKind::Created).with_executable("NotePad.EXE");
        assert!(trigger.matches(EventKind::Created, &notepad()));

        let other = Trigger::on(EventKind::Created).with_executable("wordpad.exe");
        assert!(!other.matches(EventKind::Created, &notepad()));
    }

    #[test]
    fn test_window_without_path_never_matches_executable() {
        let trigger = Trigger::on(EventKind::Created).with_executable("notepad.exe");
        let window = WindowInfo::new(WindowHandle(2), "Notepad").with_class("Notepad");
        assert!(!trigger.matches(EventKind::Created, &window));
    }

    #[test]
    fn test_class_match_is_case_sensitive() {
        let trigger = Trigger::on(EventKind::Created).with_class("notepad");
        assert!(!trigger.matches(EventKind::Created, &notepad()));
        let trigger = Trigger::on(EventKind::Created).with_class("Notepad");
        assert!(trigger.matches(EventKind::Created, &notepad()));
    }

    #[test]
    fn test_title_pattern_is_a_search() {
        let trigger = Trigger::on(EventKind::Created)
            .with_title_pattern(TitlePattern::new("Note").unwrap());
        assert!(trigger.matches(EventKind::Created, &notepad()));

        let anchored = Trigger::on(EventKind::Created)
            .with_title_pattern(TitlePattern::new("^Notepad").unwrap());
        assert!(!anchored.matches(EventKind::Created, &notepad()));
    }

    #[test]
    fn test_matching_is_deterministic() {
        let trigger = Trigger::on(EventKind::Created)
            .with_executable("notepad.exe")
            .with_class("Notepad")
            .with_title_pattern(TitlePattern::new("Notepad$").unwrap());
        let window = notepad();
        let first = trigger.matches(EventKind::Created, &window);
        for _ in 0..10 {
            assert_eq!(trigger.matches(EventKind::Created, &window), first);
        }
        assert!(first);
    }

    #[test]
    fn test_priority_sort_is_stable_and_skips_disabled() {
        let action = Action::new(ActionKind::CloseWindow);
        let rules = vec![
            Rule::new("a", Trigger::on(EventKind::Created), action.clone()).with_priority(10),
            Rule::new("b", Trigger::on(EventKind::Created), action.clone()).with_priority(50),
            Rule::new("c", Trigger::on(EventKind::Created), action.clone()).with_priority(10),
            Rule::new("d", Trigger::on(EventKind::Created), action.clone())
                .with_priority(99)
                .disabled(),
            Rule::new("e", Trigger::on(EventKind::Created), action).with_priority(50),
        ];

        let names: Vec<&str> = enabled_by_priority(&rules)
            .iter()
            .map(|rule| rule.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "e", "a", "c"]);
    }

    #[test]
    fn test_action_target_filter() {
        let window = notepad().with_visibility(false);
        assert!(Action::new(ActionKind::CloseWindow).accepts_target(&window));
        assert!(!Action::new(ActionKind::CloseWindow)
            .visible_top_level_only()
            .accepts_target(&window));
    }

    #[test]
    fn test_rule_json_round_trip_keeps_field_names() {
        let json = r#"{
            "name": "Dedupe explorer",
            "enabled": true,
            "priority": 80,
            "trigger": {"event_type": "CREATE", "window_class": "CabinetWClass"},
            "action": {"type": "CLOSE_DUPLICATE_PATH", "is_visible": true}
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.action.kind, ActionKind::CloseDuplicatePath);
        assert!(rule.action.require_visible);
        assert!(!rule.action.require_top_level);

        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["action"]["type"], "CLOSE_DUPLICATE_PATH");
        assert_eq!(value["trigger"]["event_type"], "CREATE");
        assert!(value["trigger"].get("title_pattern").is_none());
    }

    #[test]
    fn test_invalid_regex_rejected_at_parse() {
        let json = r#"{"event_type": "CREATE", "title_pattern": "(unclosed"}"#;
        assert!(serde_json::from_str::<Trigger>(json).is_err());
    }
}
