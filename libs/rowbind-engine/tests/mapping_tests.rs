use rowbind_api::naming::ColumnNaming;
use rowbind_api::{Row, RowMapped, Value};
use rowbind_engine::{BindError, MapperConfig, ResolveOptions, RowMapper, TypeMetadataCache};

#[derive(Debug, Clone, PartialEq, RowMapped)]
struct Dst {
    foo_id: i32,
    str_value: String,
}

#[derive(Debug, PartialEq, RowMapped)]
struct Account {
    account_id: u64,
    #[row(rename = "ACCOUNT_NAME")]
    name: String,
    balance: f64,
    active: bool,
    nickname: Option<String>,
    raw: Value<'static>,
}

fn account_row() -> Row<'static> {
    Row::from([
        ("account_id", Value::from(7)),
        ("ACCOUNT_NAME", Value::from("alice")),
        ("balance", Value::from("12.5")),
        ("active", Value::from(1)),
        ("nickname", Value::Null),
        ("raw", Value::from(vec![1u8, 2])),
    ])
}

#[test]
fn snake_case_columns_as_is() {
    let mapper = RowMapper::<Dst>::new().expect("resolve");
    let row = Row::from([("foo_id", Value::from(1)), ("str_value", Value::from("str"))]);

    let result = mapper.map_row(&row).expect("map");
    assert_eq!(
        result,
        Dst {
            foo_id: 1,
            str_value: "str".to_string()
        }
    );
}

#[test]
fn camel_case_columns() {
    let config = MapperConfig::new(ColumnNaming::CamelCase);
    let mapper = RowMapper::<Dst>::with_config(&config).expect("resolve");
    let row = Row::from([("fooId", Value::from(1)), ("strValue", Value::from("str"))]);

    let result = mapper.map_row(&row).expect("map");
    assert_eq!(result.foo_id, 1);
    assert_eq!(result.str_value, "str");

    let columns: Vec<_> = mapper.plan().bindings.iter().map(|b| b.column.as_str()).collect();
    assert_eq!(columns, vec!["fooId", "strValue"]);
}

#[test]
fn config_file_drives_naming() {
    let config = MapperConfig::parse("naming = \"screaming_snake_case\"").expect("config");
    let mapper = RowMapper::<Dst>::with_config(&config).expect("resolve");
    let row = Row::from([("FOO_ID", Value::from(3)), ("STR_VALUE", Value::from("x"))]);
    assert_eq!(mapper.map_row(&row).expect("map").foo_id, 3);
}

#[test]
fn coerces_builtins_and_keeps_raw_values() {
    let mapper = RowMapper::<Account>::new().expect("resolve");
    let account = mapper.map_row(&account_row()).expect("map");

    assert_eq!(
        account,
        Account {
            account_id: 7,
            name: "alice".to_string(),
            balance: 12.5,
            active: true,
            nickname: None,
            raw: Value::from(vec![1u8, 2]),
        }
    );
}

#[test]
fn alias_bypasses_naming() {
    let config = MapperConfig::new(ColumnNaming::CamelCase);
    let mapper = RowMapper::<Account>::with_config(&config).expect("resolve");
    let row = Row::from([
        ("accountId", Value::from(1)),
        ("ACCOUNT_NAME", Value::from("bob")),
        ("balance", Value::from(0.0)),
        ("active", Value::from(false)),
        ("raw", Value::Null),
    ]);

    let account = mapper.map_row(&row).expect("map");
    assert_eq!(account.name, "bob");
    assert_eq!(account.nickname, None);
    assert_eq!(account.raw, Value::Null);
}

#[test]
fn missing_required_column_fails_only_that_row() {
    let mapper = RowMapper::<Dst>::new().expect("resolve");
    let good = Row::from([("foo_id", Value::from(1)), ("str_value", Value::from("a"))]);
    let bad = Row::from([("foo_id", Value::from(2))]);

    let results: Vec<_> = mapper.map_rows([&good, &bad, &good]).collect();
    assert!(results[0].is_ok());
    match &results[1] {
        Err(BindError::MissingColumn { column }) => assert_eq!(column, "str_value"),
        other => panic!("expected a missing column, got {other:?}"),
    }
    assert!(results[2].is_ok());
}

#[test]
fn null_in_non_nullable_column() {
    let mapper = RowMapper::<Dst>::new().expect("resolve");
    let row = Row::from([("foo_id", Value::Null), ("str_value", Value::from("a"))]);

    let err = mapper.map_row(&row).expect_err("null");
    assert!(matches!(err, BindError::NullNotAllowed { .. }));
    assert_eq!(err.column(), Some("foo_id"));
}

#[test]
fn coercion_failures_carry_the_column() {
    let mapper = RowMapper::<Dst>::new().expect("resolve");

    let overflow = Row::from([("foo_id", Value::from(i64::MAX)), ("str_value", Value::from("a"))]);
    let err = mapper.map_row(&overflow).expect_err("overflow");
    assert!(matches!(err, BindError::Coercion { ref column, .. } if column == "foo_id"));

    let unparsable = Row::from([("foo_id", Value::from("one")), ("str_value", Value::from("a"))]);
    assert!(mapper.map_row(&unparsable).is_err());
}

#[test]
fn binding_twice_yields_equal_instances() {
    let mapper = RowMapper::<Account>::new().expect("resolve");
    let row = account_row();
    assert_eq!(
        mapper.map_row(&row).expect("first"),
        mapper.map_row(&row).expect("second")
    );
}

#[test]
fn borrowed_rows_from_json() {
    let json: serde_json::Value = serde_json::json!({ "foo_id": 5, "str_value": "from json" });
    let object = json.as_object().expect("object");
    let row = Row::from_json(object);

    let mapper = RowMapper::<Dst>::new().expect("resolve");
    assert_eq!(mapper.map_row(&row).expect("map").str_value, "from json");
}

#[test]
fn plans_are_resolved_once_per_cache() {
    let cache = TypeMetadataCache::new();
    let config = MapperConfig::default();

    let first = RowMapper::<Dst>::in_cache(&cache, ResolveOptions::from(&config)).expect("first");
    let second = RowMapper::<Dst>::in_cache(&cache, ResolveOptions::from(&config)).expect("second");
    assert!(std::sync::Arc::ptr_eq(first.plan(), second.plan()));
    assert_eq!(cache.builds(), 1);

    let camel = MapperConfig::new(ColumnNaming::CamelCase);
    RowMapper::<Dst>::in_cache(&cache, ResolveOptions::from(&camel)).expect("camel");
    assert_eq!(cache.builds(), 2);
}
