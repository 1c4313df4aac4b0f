use crate::{
    Entity, MockError, Operation, Options, PlaceholderStyle, QueryMock, RawStatement, StructuralDescriptor, Value,
    json,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("deadlock detected")]
struct Deadlock;

fn update_users(fields: &[&str]) -> Option<StructuralDescriptor> {
    Some(StructuralDescriptor::new(Operation::Update, "users").with_fields(fields.iter().copied()))
}

#[tokio::test]
async fn exact_text_answers_with_data() {
    let mock = QueryMock::new();
    mock.on_sql("SELECT * FROM users").respond(json!([{ "id": 1 }]));

    let rows = mock.handle("SELECT * FROM users", params![], None).await.unwrap();

    assert_eq!(rows, json!([{ "id": 1 }]));
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn exact_text_without_params_ignores_parameter_values() {
    let mock = QueryMock::new();
    let handle = mock.on_sql("select * from users where id = ?").respond(json!("row"));

    for id in [1, 2, 3] {
        assert_eq!(mock.handle("select * from users where id = ?", params![id], None).await.unwrap(), json!("row"));
    }
    assert_eq!(handle.call_count(), 3);
    assert_eq!(handle.calls()[2].parameters, params![3]);
}

#[tokio::test]
async fn whitespace_differences_do_not_matter() {
    let mock = QueryMock::new();
    mock.on_sql("select *\n  from users").respond(json!(true));

    assert_eq!(mock.handle("  select * from\tusers ", params![], None).await.unwrap(), json!(true));
    assert_eq!(mock.calls()[0].text, "select * from users");
}

#[tokio::test]
async fn prefix_matches_equal_and_longer_text_only() {
    let mock = QueryMock::new();
    mock.on_sql("select * from users").partial().unwrap().respond(json!("users"));

    assert!(mock.handle("select * from users", params![], None).await.is_ok());
    assert!(mock.handle("select * from users where id = ?", params![1], None).await.is_ok());
    assert!(mock.handle("select * from posts", params![], None).await.unwrap_err().is_unmatched());
}

#[tokio::test]
async fn strict_params_outrank_later_prefix() {
    let mock = QueryMock::new();
    let statement = RawStatement::new("select * from users where id = ?").bind(1);
    let exact = mock.on(&statement).strict_params().unwrap().respond(json!("exact"));
    let prefix = mock.on_sql("select * from users").partial().unwrap().respond(json!("prefix"));

    assert_eq!(mock.handle_statement(&statement).await.unwrap(), json!("exact"));
    assert_eq!(mock.handle("select * from users where id = ?", params![2], None).await.unwrap(), json!("prefix"));
    assert_eq!(exact.call_count(), 1);
    assert_eq!(prefix.call_count(), 1);
}

#[tokio::test]
async fn later_registration_wins_ties() {
    let mock = QueryMock::new();
    let first = mock.on_substring("users").respond(json!("first"));
    let second = mock.on_pattern(r"from\s+users").unwrap().respond(json!("second"));

    assert_eq!(mock.handle("select * from users", params![], None).await.unwrap(), json!("second"));
    assert_eq!(first.call_count(), 0);
    assert_eq!(second.call_count(), 1);
}

#[tokio::test]
async fn once_falls_through_then_fails() {
    let mock = QueryMock::new();
    mock.on_substring("users").respond(json!("fallback"));
    mock.on_sql("select * from users").once().unwrap().respond(json!("once"));
    mock.on_sql("select * from posts").once().unwrap().respond(json!("posts"));

    assert_eq!(mock.handle("select * from users", params![], None).await.unwrap(), json!("once"));
    assert_eq!(mock.handle("select * from users", params![], None).await.unwrap(), json!("fallback"));

    assert_eq!(mock.handle("select * from posts", params![], None).await.unwrap(), json!("posts"));
    let err = mock.handle("select * from posts", params![], None).await.unwrap_err();
    assert!(err.is_unmatched());
    assert!(err.to_string().contains("(consumed)"));
}

#[tokio::test]
async fn respond_once_queue_then_fallback() {
    let mock = QueryMock::new();
    let handle = mock
        .on_sql("select nextval('seq')")
        .respond_once(json!(1))
        .respond_once(json!(2))
        .respond_once(json!(3))
        .respond(json!(0));

    let mut answers = Vec::new();
    for _ in 0..5 {
        answers.push(mock.handle("select nextval('seq')", params![], None).await.unwrap());
    }

    assert_eq!(answers, vec![json!(1), json!(2), json!(3), json!(0), json!(0)]);
    assert_eq!(handle.call_count(), 5);
    assert_eq!(mock.mock_count(), 1);
}

#[tokio::test]
async fn respond_once_queue_without_fallback_fails_when_drained() {
    let mock = QueryMock::new();
    let builder = mock.on_sql("select 1").respond_once(json!("a")).respond_once(json!("b"));
    let handle = builder.handle();

    assert_eq!(mock.handle("select 1", params![], None).await.unwrap(), json!("a"));
    assert_eq!(mock.handle("select 1", params![], None).await.unwrap(), json!("b"));
    assert!(mock.handle("select 1", params![], None).await.unwrap_err().is_unmatched());
    assert_eq!(handle.call_count(), 2);
}

#[tokio::test]
async fn structural_field_subset_rule() {
    let mock = QueryMock::new();
    let narrow =
        mock.on_structural("users", Operation::Update).with_fields(["name"]).unwrap().respond(json!({ "rowCount": 1 }));

    let sql = "update users set name = ?, email = ?";
    let out = mock.handle(sql, params!["a", "b"], update_users(&["name", "email"])).await;
    assert_eq!(out.unwrap(), json!({ "rowCount": 1 }));
    assert_eq!(narrow.call_count(), 1);

    mock.reset_mocks();
    mock.on_structural("users", Operation::Update)
        .with_fields(["name", "email"])
        .unwrap()
        .respond(json!({ "rowCount": 2 }));
    let err = mock.handle("update users set name = ?", params!["a"], update_users(&["name"])).await.unwrap_err();
    assert!(err.is_unmatched());
}

#[tokio::test]
async fn structural_matchers_require_a_descriptor() {
    let mock = QueryMock::new();
    mock.on_structural("users", Operation::Select).respond(json!("shape"));
    mock.on_substring("users").respond(json!("text"));

    assert_eq!(mock.handle("select * from users", params![], None).await.unwrap(), json!("text"));
}

#[tokio::test]
async fn structural_ranks_below_loose_text_only() {
    let mock = QueryMock::new();
    let descriptor = Some(StructuralDescriptor::new(Operation::Select, Entity::new("users").in_schema("app")));
    mock.on_structural(Entity::new("users").in_schema("app"), Operation::Select).respond(json!("structural"));
    mock.on_substring("users").respond(json!("substring"));

    let out = mock.handle("select * from app.users", params![], descriptor.clone()).await;
    assert_eq!(out.unwrap(), json!("structural"));

    mock.on_sql("select * from app.users").partial().unwrap().respond(json!("prefix"));
    assert_eq!(mock.handle("select * from app.users", params![], descriptor).await.unwrap(), json!("prefix"));
}

#[tokio::test]
async fn sql_fragments_disambiguate_find_first() {
    let mock = QueryMock::new();
    let sql = "select * from users where \"email\" = ? limit ?";
    let find_first = || Some(StructuralDescriptor::new(Operation::FindFirst, "users"));

    let alice = mock
        .on_structural("users", Operation::FindFirst)
        .where_sql("\"email\" = ?", params!["alice@example.com"])
        .unwrap()
        .respond(json!({ "id": 1 }));
    let bob = mock
        .on_structural("users", Operation::FindFirst)
        .where_sql("\"email\" = ?", params!["bob@example.com"])
        .unwrap()
        .respond(json!({ "id": 2 }));
    mock.on_structural("users", Operation::FindFirst).respond(Value::Null);

    assert_eq!(mock.handle(sql, params!["alice@example.com", 1], find_first()).await.unwrap(), json!({ "id": 1 }));
    assert_eq!(mock.handle(sql, params!["bob@example.com", 1], find_first()).await.unwrap(), json!({ "id": 2 }));
    assert_eq!(mock.handle(sql, params!["carol@example.com", 1], find_first()).await.unwrap(), Value::Null);
    assert_eq!((alice.call_count(), bob.call_count()), (1, 1));
}

#[tokio::test]
async fn dollar_placeholders_are_honoured_when_configured() {
    let mock = QueryMock::with_options(Options { placeholder: PlaceholderStyle::Dollar });
    assert_eq!(mock.options().placeholder, PlaceholderStyle::Dollar);
    mock.on_structural("users", Operation::Delete).where_sql("id = $2", params![9]).unwrap().respond(json!(1));

    let descriptor = Some(StructuralDescriptor::new(Operation::Delete, "users"));
    let out = mock.handle("delete from users where org = $1 and id = $2", params![3, 9], descriptor).await;
    assert_eq!(out.unwrap(), json!(1));
}

#[tokio::test]
async fn on_shape_copies_the_statement_descriptor() {
    let mock = QueryMock::new();
    let statement =
        RawStatement::new("update users set name = ?").bind("x").shaped(Operation::Update, "users").fields(["name"]);
    mock.on_shape(&statement).unwrap().respond(json!("shape"));

    let wider = RawStatement::new("update users set name = ?, email = ?")
        .bind_all(params!["x", "y"])
        .shaped(Operation::Update, "users")
        .fields(["name", "email"]);
    assert_eq!(mock.handle_statement(&wider).await.unwrap(), json!("shape"));

    let missing = mock.on_shape(&RawStatement::new("select 1"));
    assert!(matches!(missing, Err(MockError::MissingDescriptor)));
}

#[tokio::test]
async fn computed_responses_are_awaited_uniformly() {
    let mock = QueryMock::new();
    mock.on_sql("select count(*) from users").respond_with(|text, params| json!({ "text": text, "n": params.len() }));
    mock.on_sql("select now()").respond_with_async(|_, _| async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        json!("later")
    });

    let sync = mock.handle("select count(*) from users", params![1, 2], None).await.unwrap();
    let asynchronous = mock.handle("select now()", params![], None).await.unwrap();

    assert_eq!(sync, json!({ "text": "select count(*) from users", "n": 2 }));
    assert_eq!(asynchronous, json!("later"));
}

#[tokio::test]
async fn computed_responses_run_once_per_call() {
    let mock = QueryMock::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);
    mock.on_substring("insert").respond_with(move |_, _| json!(seen.fetch_add(1, Ordering::SeqCst) + 1));

    assert_eq!(mock.handle("insert into t values (1)", params![], None).await.unwrap(), json!(1));
    assert_eq!(mock.handle("insert into t values (2)", params![], None).await.unwrap(), json!(2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn throw_returns_the_same_error_object_and_still_records() {
    let mock = QueryMock::new();
    let handle = mock.on_sql("update accounts set balance = ?").throw(Deadlock);
    mock.on_sql("update accounts set balance = ?").partial().unwrap().respond(json!("never"));

    let first = mock.handle("update accounts set balance = ?", params![10], None).await.unwrap_err();
    let second = mock.handle("update accounts set balance = ?", params![20], None).await.unwrap_err();

    assert_eq!(first.to_string(), "deadlock detected");
    assert!(first.downcast_simulated::<Deadlock>().is_some());
    assert!(Arc::ptr_eq(first.simulated().unwrap(), second.simulated().unwrap()));
    assert_eq!(handle.call_count(), 2);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn failure_override_beats_a_fallback_compute() {
    let mock = QueryMock::new();
    let computed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&computed);
    mock.on_sql("select 1").respond_with(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
        json!(1)
    });
    mock.on_sql("select 1").throw(Deadlock);

    assert!(mock.handle("select 1", params![], None).await.unwrap_err().simulated().is_some());
    assert_eq!(computed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unmatched_calls_are_recorded_and_described() {
    let mock = QueryMock::new();
    let err = mock.handle("select * from missing", params![42], None).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("select * from missing"));
    assert!(msg.contains("[42]"));
    assert!(msg.contains("no mocks are registered"));

    mock.on_sql("select 1").respond(json!(1));
    mock.on_structural("users", Operation::Insert).with_fields(["id"]).unwrap().throw(Deadlock);
    let msg = mock.handle("select 2", params![], None).await.unwrap_err().to_string();
    assert!(msg.contains("1. exact \"select 1\" -> data"));
    assert!(msg.contains("2. structural insert users fields={id} -> throw"));

    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn failed_calls_do_not_disturb_later_ones() {
    let mock = QueryMock::new();
    let handle = mock.on_sql("select 1").respond(json!(1));

    assert!(mock.handle("select 2", params![], None).await.is_err());
    assert_eq!(mock.handle("select 1", params![], None).await.unwrap(), json!(1));
    assert_eq!(handle.call_count(), 1);
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn reset_calls_keeps_entries() {
    let mock = QueryMock::new();
    let handle = mock.on_sql("select 1").respond(json!(1));
    mock.handle("select 1", params![], None).await.unwrap();

    mock.reset_calls();
    assert_eq!(mock.calls().len(), 0);
    assert_eq!(mock.handle("select 1", params![], None).await.unwrap(), json!(1));
    assert_eq!(handle.call_count(), 2);
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn reset_mocks_keeps_the_ledger() {
    let mock = QueryMock::new();
    mock.on_sql("select 1").respond(json!(1));
    mock.handle("select 1", params![], None).await.unwrap();

    mock.reset_mocks();
    mock.reset_mocks();
    assert_eq!(mock.mock_count(), 0);
    assert_eq!(mock.calls().len(), 1);
    assert!(mock.handle("select 1", params![], None).await.unwrap_err().is_unmatched());
    assert_eq!(mock.calls().len(), 2);
}

#[tokio::test]
async fn reset_clears_everything() {
    let mock = QueryMock::new();
    mock.on_sql("select 1").respond(json!(1));
    mock.handle("select 1", params![], None).await.unwrap();

    mock.reset();
    mock.reset();
    assert_eq!(mock.mock_count(), 0);
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn clones_share_state() {
    let mock = QueryMock::new();
    let under_test = mock.clone();
    mock.on_sql("select 1").respond(json!(1));

    assert_eq!(under_test.handle("select 1", params![], None).await.unwrap(), json!(1));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn unused_mocks_lists_expectations_never_hit() {
    let mock = QueryMock::new();
    mock.on_sql("select 1").respond(json!(1));
    mock.on_sql("select 2").respond(json!(2));
    mock.handle("select 1", params![], None).await.unwrap();

    assert_eq!(mock.unused_mocks(), vec!["exact \"select 2\" -> data".to_string()]);
    assert_eq!(mock.describe().len(), 2);
}

#[tokio::test]
async fn pattern_compile_errors_surface_at_registration() {
    let mock = QueryMock::new();
    assert!(matches!(mock.on_pattern("select ("), Err(MockError::InvalidPattern(_))));
    assert_eq!(mock.mock_count(), 0);
}

#[tokio::test]
async fn builder_reused_after_reset_registers_a_fresh_expectation() {
    let mock = QueryMock::new();
    let builder = mock.on_sql("select 1").respond_once(json!(1));
    let before_reset = builder.handle();
    assert_eq!(mock.handle("select 1", params![], None).await.unwrap(), json!(1));

    mock.reset_mocks();
    let builder = builder.respond_once(json!(2));
    let after_reset = builder.handle();

    assert_eq!(mock.mock_count(), 1);
    assert_eq!(after_reset.call_count(), 0);
    assert_eq!(mock.unused_mocks(), vec!["exact \"select 1\" -> queue queued=1 [once]".to_string()]);

    assert_eq!(mock.handle("select 1", params![], None).await.unwrap(), json!(2));
    assert_eq!(after_reset.call_count(), 1);
    assert_eq!(before_reset.call_count(), 1);
}

#[tokio::test]
async fn compute_closures_may_call_back_into_the_controller() {
    let mock = QueryMock::new();
    let inner = mock.clone();
    mock.on_sql("select count(*) from calls").respond_with(move |_, _| json!(inner.call_count()));

    let answer =
        tokio::time::timeout(Duration::from_secs(1), mock.handle("select count(*) from calls", params![], None)).await;

    assert_eq!(answer.expect("controller lock held across compute").unwrap(), json!(1));
}

#[tokio::test]
async fn substrings_are_whitespace_normalized() {
    let mock = QueryMock::new();
    mock.on_substring("from \n users").respond(json!("users"));

    assert_eq!(mock.handle("select * from  users", params![], None).await.unwrap(), json!("users"));
    assert_eq!(mock.describe(), vec!["substring \"from users\" -> data".to_string()]);
}
