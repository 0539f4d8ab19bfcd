use rowbind_api::metadata::{AnyValue, Args};
use rowbind_api::row::Row;

use crate::error::BindError;
use crate::plan::{CoercionStrategy, ConstructionPlan, ParameterBinding};

/// Build one instance of `plan.target` from `row`.
///
/// All or nothing: the first failing parameter aborts the row, and the
/// factory is only invoked once every argument is ready.
pub fn bind(plan: &ConstructionPlan, row: &Row<'_>) -> Result<AnyValue, BindError> {
    let mut args = Args::with_capacity(plan.target.name(), plan.bindings.len());
    for binding in &plan.bindings {
        args.push(bind_parameter(binding, row)?);
    }
    plan.invoke(args).map_err(|source| BindError::Construction {
        type_name: plan.target.name(),
        source,
    })
}

fn bind_parameter(
    binding: &ParameterBinding,
    row: &Row<'_>,
) -> Result<Option<AnyValue>, BindError> {
    match &binding.strategy {
        CoercionStrategy::Default(make) => Ok(Some(make())),
        CoercionStrategy::Flatten(inner) => {
            if binding.nullable && all_absent_or_null(inner, row) {
                return Ok(None);
            }
            bind(inner, row).map(Some)
        }
        strategy => match row.get(&binding.column) {
            None if binding.required => Err(BindError::MissingColumn {
                column: binding.column.clone(),
            }),
            None => Ok(None),
            Some(value) if value.is_null() && binding.nullable => Ok(None),
            Some(value) if value.is_null() && !strategy.accepts_null() => {
                Err(BindError::NullNotAllowed {
                    column: binding.column.clone(),
                })
            }
            Some(value) => strategy
                .coerce(value)
                .map(Some)
                .map_err(|source| BindError::Coercion {
                    column: binding.column.clone(),
                    source,
                }),
        },
    }
}

fn all_absent_or_null(plan: &ConstructionPlan, row: &Row<'_>) -> bool {
    plan.bindings.iter().all(|binding| match &binding.strategy {
        CoercionStrategy::Default(_) => true,
        CoercionStrategy::Flatten(inner) => all_absent_or_null(inner, row),
        _ => row.get(&binding.column).is_none_or(|v| v.is_null()),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rowbind_api::metadata::{Invocable, TypeKey};
    use rowbind_api::value::Value;

    use super::*;
    use crate::coercion::Primitive;
    use crate::plan::ConstructionStrategy;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        label: Option<String>,
    }

    fn binding(parameter: &'static str, strategy: CoercionStrategy, nullable: bool) -> ParameterBinding {
        ParameterBinding {
            parameter,
            column: parameter.to_string(),
            strategy,
            required: !nullable,
            nullable,
        }
    }

    fn point_plan() -> ConstructionPlan {
        ConstructionPlan::new(
            TypeKey::of::<Point>(),
            "Point",
            ConstructionStrategy::Constructor,
            false,
            vec![
                binding("x", CoercionStrategy::Builtin(Primitive::I32), false),
                binding("label", CoercionStrategy::Builtin(Primitive::String), true),
            ],
            Invocable::new(|mut args: Args| {
                Ok(Box::new(Point {
                    x: args.take(0)?,
                    label: args.take_nullable(1)?,
                }) as AnyValue)
            }),
        )
    }

    fn point(plan: &ConstructionPlan, row: &Row<'_>) -> Result<Point, BindError> {
        bind(plan, row).map(|v| *v.downcast::<Point>().expect("Point"))
    }

    #[test]
    fn binds_in_parameter_order() {
        let plan = point_plan();
        let row = Row::from([("label", Value::from("a")), ("x", Value::from("7"))]);
        assert_eq!(
            point(&plan, &row).expect("bind"),
            Point {
                x: 7,
                label: Some("a".to_string())
            }
        );
    }

    #[test]
    fn optional_columns_may_be_absent_or_null() {
        let plan = point_plan();
        let absent = Row::from([("x", Value::from(1))]);
        let null = Row::from([("x", Value::from(1)), ("label", Value::Null)]);
        assert_eq!(point(&plan, &absent).expect("absent").label, None);
        assert_eq!(point(&plan, &null).expect("null").label, None);
    }

    #[test]
    fn failures_name_the_column() {
        let plan = point_plan();

        let err = point(&plan, &Row::from([("label", Value::from("a"))])).expect_err("missing");
        assert!(matches!(err, BindError::MissingColumn { ref column } if column == "x"));

        let err = point(&plan, &Row::from([("x", Value::Null)])).expect_err("null");
        assert!(matches!(err, BindError::NullNotAllowed { .. }));
        assert_eq!(err.column(), Some("x"));

        let err = point(&plan, &Row::from([("x", Value::from("seven"))])).expect_err("parse");
        assert!(matches!(err, BindError::Coercion { .. }));
        assert_eq!(err.column(), Some("x"));
    }

    #[test]
    fn nullable_flatten_is_none_when_all_leaves_are_missing() {
        let inner = point_plan().rebased("at", rowbind_api::naming::NameJoiner::Snake);
        let plan = ConstructionPlan::new(
            TypeKey::of::<Option<Point>>(),
            "Wrapper",
            ConstructionStrategy::Constructor,
            false,
            vec![binding("at", CoercionStrategy::Flatten(Arc::new(inner)), true)],
            Invocable::new(|mut args: Args| Ok(Box::new(args.take_nullable::<Point>(0)?) as AnyValue)),
        );

        let empty = bind(&plan, &Row::from([("at_label", Value::Null)])).expect("none");
        assert_eq!(*empty.downcast::<Option<Point>>().expect("Option<Point>"), None);

        let some = bind(&plan, &Row::from([("at_x", Value::from(3))])).expect("some");
        assert_eq!(
            *some.downcast::<Option<Point>>().expect("Option<Point>"),
            Some(Point { x: 3, label: None })
        );
    }

    #[test]
    fn construction_failures_are_wrapped() {
        let plan = ConstructionPlan::new(
            TypeKey::of::<Point>(),
            "Point",
            ConstructionStrategy::Constructor,
            false,
            Vec::new(),
            Invocable::new(|_| Err("refused".into())),
        );
        let err = bind(&plan, &Row::new()).expect_err("construction");
        assert!(matches!(err, BindError::Construction { .. }));
        assert!(err.to_string().contains("refused"));
    }
}
