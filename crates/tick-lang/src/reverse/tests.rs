use std::collections::BTreeMap;
use std::time::Duration;

use super::reverse;
use crate::error::{GenerateError, ReverseError};
use crate::generate::generate;
use crate::rule::*;

fn base_rule() -> AlertRule {
    AlertRule {
        name: "Mem usage".into(),
        query: Some(QueryConfig {
            database: "telegraf".into(),
            retention_policy: "autogen".into(),
            measurement: "mem".into(),
            fields: vec![Field {
                name: "used_percent".into(),
                function: Some(Aggregate::Max),
            }],
            group_by: GroupBy {
                time: Some(Duration::from_secs(300)),
                tags: vec!["host".into()],
            },
            ..QueryConfig::default()
        }),
        conditions: vec![Condition {
            level: Level::Crit,
            operator: Operator::GreaterThan,
            value: 95.0,
            upper: None,
        }],
        message: "{{.ID}} is {{.Level}}".into(),
        details: "<b>{{.Name}}</b>".into(),
        ..AlertRule::default()
    }
}

fn round_trip(rule: &AlertRule) -> AlertRule {
    let script = generate(rule).unwrap();
    reverse(&script).unwrap()
}

#[test]
fn threshold_round_trip() {
    let rule = base_rule();
    assert_eq!(round_trip(&rule), rule);
}

#[test]
fn every_round_trip_with_and_without_window() {
    let mut rule = base_rule();
    rule.every = Some(Duration::from_secs(60));
    assert_eq!(round_trip(&rule), rule);

    rule.query.as_mut().unwrap().group_by.time = None;
    assert_eq!(round_trip(&rule), rule);

    rule.every = None;
    assert_eq!(round_trip(&rule), rule);
}

#[test]
fn tag_filters_round_trip() {
    let mut rule = base_rule();
    let query = rule.query.as_mut().unwrap();
    query.tags = BTreeMap::from([
        ("host".to_string(), vec!["web-1".to_string(), "web-2".to_string()]),
        ("region".to_string(), vec!["eu".to_string()]),
    ]);
    assert_eq!(round_trip(&rule), rule);

    rule.query.as_mut().unwrap().are_tags_accepted = false;
    assert_eq!(round_trip(&rule), rule);
}

#[test]
fn rejection_without_tags_is_not_generated() {
    let mut rule = base_rule();
    rule.query.as_mut().unwrap().are_tags_accepted = false;
    assert_eq!(
        generate(&rule),
        Err(GenerateError::InvalidQuery(
            "tag rejection needs at least one tag".into()
        ))
    );
}

#[test]
fn range_conditions_round_trip() {
    let mut rule = base_rule();
    rule.conditions = vec![
        Condition {
            level: Level::Warn,
            operator: Operator::InsideRange,
            value: 80.0,
            upper: Some(95.0),
        },
        Condition {
            level: Level::Info,
            operator: Operator::OutsideRange,
            value: -1.5,
            upper: Some(10.0),
        },
        Condition {
            level: Level::Crit,
            operator: Operator::NotEqualTo,
            value: 0.0,
            upper: None,
        },
    ];
    assert_eq!(round_trip(&rule), rule);
}

#[test]
fn relative_round_trip() {
    for change in [Change::Change, Change::PercentChange] {
        let mut rule = base_rule();
        rule.trigger = Trigger::Relative {
            change,
            shift: Duration::from_secs(1800),
        };
        assert_eq!(round_trip(&rule), rule);
    }
}

#[test]
fn unaggregated_field_round_trip() {
    let mut rule = base_rule();
    rule.query.as_mut().unwrap().fields[0].function = None;
    assert_eq!(round_trip(&rule), rule);
}

#[test]
fn batch_round_trip() {
    let rule = AlertRule {
        name: "Slow queries".into(),
        query: Some(QueryConfig {
            database: "telegraf".into(),
            retention_policy: "autogen".into(),
            raw_text: Some(r#"SELECT mean("duration") AS "value" FROM "queries""#.into()),
            group_by: GroupBy {
                time: Some(Duration::from_secs(600)),
                tags: vec!["service".into()],
            },
            ..QueryConfig::default()
        }),
        every: Some(Duration::from_secs(120)),
        conditions: vec![Condition {
            level: Level::Warn,
            operator: Operator::GreaterEqual,
            value: 250.0,
            upper: None,
        }],
        ..AlertRule::default()
    };
    let back = round_trip(&rule);
    assert_eq!(back, rule);
    assert_eq!(back.task_type(), TaskType::Batch);
}

#[test]
fn handlers_round_trip() {
    let mut rule = base_rule();
    rule.handlers = vec![
        Handler::Email {
            to: vec!["oncall@example.com".into()],
        },
        Handler::Email { to: vec![] },
        Handler::Slack {
            channel: Some("#alerts".into()),
        },
        Handler::Slack { channel: None },
        Handler::PagerDuty,
        Handler::Log {
            path: "/tmp/alerts.log".into(),
        },
        Handler::Post {
            url: "https://hooks.example.com".into(),
        },
        Handler::Tcp {
            address: "127.0.0.1:7777".into(),
        },
        Handler::Exec {
            command: vec!["/usr/bin/page".into(), "ops".into()],
        },
    ];
    assert_eq!(round_trip(&rule), rule);
}

#[test]
fn reverse_hand_written_script() {
    let text = r#"
var name = 'disk full'

var data = stream
    |from()
        .measurement('disk')
    |last('used')
        .as('value')

var trigger = data
    |alert()
        .warn(lambda: "value" >= 90)
        .message('disk almost full')
        .pagerDuty()
"#;
    let rule = reverse(&Script::new(text)).unwrap();
    assert_eq!(rule.name, "disk full");
    assert_eq!(rule.message, "disk almost full");
    let query = rule.query.as_ref().unwrap();
    assert_eq!(query.measurement, "disk");
    assert_eq!(
        query.fields,
        vec![Field {
            name: "used".into(),
            function: Some(Aggregate::Last),
        }]
    );
    assert_eq!(rule.conditions[0].operator, Operator::GreaterEqual);
    assert_eq!(rule.conditions[0].value, 90.0);
    assert_eq!(rule.handlers, vec![Handler::PagerDuty]);
    assert_eq!(rule.trigger, Trigger::Threshold);
}

#[test]
fn syntax_error() {
    let err = reverse(&Script::new("var = |")).unwrap_err();
    assert!(matches!(err, ReverseError::Syntax(_)));
}

#[test]
fn unknown_handler_keeps_partial_rule() {
    let mut text = generate(&base_rule()).unwrap().to_string();
    text = text.replace(".stateChangesOnly()", ".stateChangesOnly()\n        .victorOps()");
    match reverse(&Script::new(text)) {
        Err(ReverseError::Unsupported { reason, partial }) => {
            assert!(reason.contains("victorOps"));
            assert_eq!(partial.name, "Mem usage");
            assert_eq!(partial.query.as_ref().unwrap().measurement, "mem");
            assert_eq!(partial.conditions.len(), 1);
        }
        other => panic!("expected unsupported, got {other:?}"),
    }
}

#[test]
fn missing_name_is_unsupported() {
    let text = "var data = stream\n    |from()\n        .measurement('cpu')\n";
    let err = reverse(&Script::new(text)).unwrap_err();
    assert!(matches!(err, ReverseError::Unsupported { .. }));
}

#[test]
fn mixed_where_filter_is_unsupported() {
    let text = r#"
var name = 'mixed'
var data = stream
    |from()
        .measurement('cpu')
        .where(lambda: "host" == 'a' AND "cpu" != 'b')
    |mean('usage')
        .as('value')
var trigger = data
    |alert()
        .crit(lambda: "value" > 1)
"#;
    match reverse(&Script::new(text)) {
        Err(ReverseError::Unsupported { reason, .. }) => assert!(reason.contains("where")),
        other => panic!("expected unsupported, got {other:?}"),
    }
}
