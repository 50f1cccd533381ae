// tests/parser_tests.rs

mod common;

use odata_expr::ast::{BinaryOp, Expr, Function, Quantifier, Type, UnaryOp};
use odata_expr::parser::DEFAULT_MAX_DEPTH;
use odata_expr::{
    AllowList, Error, ParseError, ParseErrorKind, Parser, ParserOptions, Primitive, PrimitiveKind, parse_compute,
    parse_filter,
};

use common::{allowed, order_type, parse};

fn parse_err(text: &str) -> ParseError {
    let entity = order_type();
    match parse_filter(text, &entity, &allowed(&entity)) {
        Err(Error::Parse(e)) => e,
        other => panic!("expected a parse error for {text}, got {other:?}"),
    }
}

fn field_name(expr: &Expr) -> &str {
    match expr {
        Expr::Field(field) => &field.name,
        other => panic!("expected a field, got {other:?}"),
    }
}

// ============================================================================
// Precedence and grouping
// ============================================================================

#[test]
fn test_multiplication_binds_tighter() {
    let expr = parse("1 add 2 mul 3 eq 7");

    // Should be: Eq(Add(1, Mul(2, 3)), 7)
    let Expr::Binary { op: BinaryOp::Eq, left, .. } = expr else {
        panic!("expected eq at the root");
    };
    let Expr::Binary { op: BinaryOp::Add, left: one, right } = *left else {
        panic!("expected add under eq");
    };
    assert_eq!(*one, Expr::Literal(Primitive::Int32(1)));
    assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn test_parentheses_override_precedence() {
    let expr = parse("(1 add 2) mul 3 eq 9");
    let Expr::Binary { left, .. } = expr else {
        panic!("expected a binary root");
    };
    let Expr::Binary { op: BinaryOp::Mul, left, .. } = *left else {
        panic!("expected mul under eq");
    };
    assert!(matches!(*left, Expr::Binary { op: BinaryOp::Add, .. }));
}

#[test]
fn test_left_associativity() {
    let expr = parse("age sub 1 sub 2 eq 0");
    let Expr::Binary { left, .. } = expr else {
        panic!("expected a binary root");
    };
    let Expr::Binary { op: BinaryOp::Sub, left, right } = *left else {
        panic!("expected sub");
    };
    assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
    assert_eq!(*right, Expr::Literal(Primitive::Int32(2)));
}

#[test]
fn test_and_binds_tighter_than_or() {
    let expr = parse("active or age gt 1 and age lt 9");
    let Expr::Binary { op: BinaryOp::Or, right, .. } = expr else {
        panic!("expected or at the root");
    };
    assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
}

#[test]
fn test_not_forms() {
    let expr = parse("not active");
    assert!(matches!(expr, Expr::Unary { op: UnaryOp::Not, .. }));

    let expr = parse("not(age gt 30)");
    let Expr::Unary { op: UnaryOp::Not, operand } = expr else {
        panic!("expected not");
    };
    assert!(matches!(*operand, Expr::Binary { op: BinaryOp::Gt, .. }));
}

#[test]
fn test_negation() {
    let expr = parse("-age lt -5");
    let Expr::Binary { op: BinaryOp::Lt, left, right } = expr else {
        panic!("expected lt");
    };
    assert!(matches!(*left, Expr::Unary { op: UnaryOp::Negate, .. }));
    assert_eq!(*right, Expr::Literal(Primitive::Int32(-5)));
}

#[test]
fn test_display_keeps_needed_parentheses() {
    assert_eq!(parse("1 add 2 mul 3 eq 7").to_string(), "1 add 2 mul 3 eq 7");
    assert_eq!(parse("((1 add 2)) mul 3 eq 9").to_string(), "(1 add 2) mul 3 eq 9");
    assert_eq!(parse("age sub (1 sub 2) eq 0").to_string(), "age sub (1 sub 2) eq 0");
    assert_eq!(parse("not (age gt 30)").to_string(), "not (age gt 30)");
    assert_eq!(parse("(name eq 'a') or (age gt 1)").to_string(), "name eq 'a' or age gt 1");
}

// ============================================================================
// References and types
// ============================================================================

#[test]
fn test_field_carries_source_and_type() {
    let expr = parse("customer eq 'Zed'");
    let Expr::Binary { left, .. } = expr else {
        panic!("expected a binary root");
    };
    let Expr::Field(field) = *left else {
        panic!("expected a field");
    };
    assert_eq!(field.name, "customer");
    assert_eq!(field.source, "customer_name");
    assert_eq!(field.ty, Type::Primitive(PrimitiveKind::String));
    assert_eq!(field.variable, None);
}

#[test]
fn test_literal_takes_the_other_side_type() {
    let expr = parse("price gt 10");
    let Expr::Binary { right, .. } = expr else {
        panic!("expected a binary root");
    };
    assert_eq!(*right, Expr::Literal(common::decimal("10")));

    let expr = parse("'Red' eq color");
    let Expr::Binary { left, .. } = expr else {
        panic!("expected a binary root");
    };
    assert_eq!(*left, Expr::Literal(common::color_value("Red")));
}

#[test]
fn test_in_list() {
    let expr = parse("color in ('Red', 'Blue')");
    let Expr::In { operand, list } = expr else {
        panic!("expected in");
    };
    assert_eq!(field_name(&operand), "color");
    assert_eq!(list, vec![common::color_value("Red"), common::color_value("Blue")]);
}

#[test]
fn test_function_call() {
    let expr = parse("substring(name, 1, 2) eq 'li'");
    let Expr::Binary { left, .. } = expr else {
        panic!("expected a binary root");
    };
    let Expr::Call { function, args } = *left else {
        panic!("expected a call");
    };
    assert_eq!(function, Function::Substring);
    assert_eq!(args.len(), 3);
}

#[test]
fn test_call_result_types() {
    let entity = order_type();
    let items = parse_compute(
        "length(name) as n, totalseconds(lead) as s, round(rating) as r, year(ship_date) as y",
        &entity,
        &allowed(&entity),
    )
    .unwrap();
    let types: Vec<Type> = items.iter().map(|item| item.expr.ty()).collect();
    assert_eq!(
        types,
        vec![
            Type::Primitive(PrimitiveKind::Int32),
            Type::Primitive(PrimitiveKind::Decimal),
            Type::Primitive(PrimitiveKind::Double),
            Type::Primitive(PrimitiveKind::Int32),
        ]
    );
}

#[test]
fn test_divby_of_integers_is_decimal() {
    let entity = order_type();
    let items = parse_compute("age divby 2 as half, age div 2 as whole", &entity, &allowed(&entity)).unwrap();
    assert_eq!(items[0].expr.ty(), Type::Primitive(PrimitiveKind::Decimal));
    assert_eq!(items[1].expr.ty(), Type::Primitive(PrimitiveKind::Int64));
}

// ============================================================================
// Lambdas
// ============================================================================

#[test]
fn test_lambda_any() {
    let expr = parse("items/any(i:i/price gt 10)");
    let Expr::Lambda(lambda) = expr else {
        panic!("expected a lambda");
    };
    assert_eq!(lambda.quantifier, Quantifier::Any);
    assert_eq!(lambda.variable, "i");
    assert_eq!(lambda.navigation.name, "items");
    assert_eq!(lambda.navigation.link.target_key, "order_id");

    let Some(body) = lambda.body else {
        panic!("expected a body");
    };
    let Expr::Binary { left, .. } = *body else {
        panic!("expected a comparison body");
    };
    let Expr::Field(field) = *left else {
        panic!("expected a field");
    };
    assert_eq!(field.variable.as_deref(), Some("i"));
    assert_eq!(field.ty, Type::Primitive(PrimitiveKind::Decimal));
}

#[test]
fn test_lambda_without_body() {
    let Expr::Lambda(lambda) = parse("items/any()") else {
        panic!("expected a lambda");
    };
    assert!(lambda.body.is_none());
}

#[test]
fn test_root_references_inside_lambda() {
    let Expr::Lambda(lambda) = parse("items/all(i:i/price le price and $it/age gt 1)") else {
        panic!("expected a lambda");
    };
    assert_eq!(lambda.quantifier, Quantifier::All);
    let Some(body) = lambda.body else {
        panic!("expected a body");
    };
    let Expr::Binary { left, right, .. } = *body else {
        panic!("expected and");
    };
    let Expr::Binary { right: root_price, .. } = *left else {
        panic!("expected le");
    };
    let Expr::Field(field) = *root_price else {
        panic!("expected a field");
    };
    assert_eq!(field.variable, None);

    let Expr::Binary { left: it_age, .. } = *right else {
        panic!("expected gt");
    };
    assert_eq!(field_name(&it_age), "age");
}

#[test]
fn test_lambda_display() {
    assert_eq!(parse("items/any(i:i/qty ge 2)").to_string(), "items/any(i:i/qty ge 2)");
    assert_eq!(parse("items/any()").to_string(), "items/any()");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_at_end_of_input() {
    let err = parse_err("name eq ");
    assert!(matches!(err.kind, ParseErrorKind::UnexpectedEnd { .. }));
    assert_eq!(err.offset, 8);
}

#[test]
fn test_empty_expression() {
    assert_eq!(parse_err("   ").kind, ParseErrorKind::Empty);
}

#[test]
fn test_unbalanced_parentheses() {
    assert_eq!(parse_err("(age gt 1").kind, ParseErrorKind::UnbalancedParenthesis);
    assert_eq!(parse_err("age gt 1)").kind, ParseErrorKind::UnbalancedParenthesis);
}

#[test]
fn test_unknown_names() {
    assert_eq!(parse_err("nope eq 1").kind, ParseErrorKind::UnknownProperty("nope".to_string()));
    assert_eq!(parse_err("x/price eq 1").kind, ParseErrorKind::UnknownVariable("x".to_string()));
    assert_eq!(parse_err("shout(name)").kind, ParseErrorKind::UnknownFunction("shout".to_string()));
    assert_eq!(
        parse_err("items/any(i:i/nope eq 1)").kind,
        ParseErrorKind::UnknownProperty("i/nope".to_string())
    );
}

#[test]
fn test_property_outside_allow_list() {
    let err = parse_err("secret eq 1");
    assert_eq!(err.kind, ParseErrorKind::NotAllowed("secret".to_string()));
    assert!(err.is_authorization());
}

#[test]
fn test_lambda_path_outside_allow_list() {
    let entity = order_type();
    let allowed = AllowList::new(["id", "items"]);
    let err = parse_filter("items/any(i:i/price gt 1)", &entity, &allowed).unwrap_err();
    assert!(err.is_authorization());
    assert!(err.to_string().contains("items/price"));
}

#[test]
fn test_type_errors() {
    assert!(matches!(parse_err("name gt 5").kind, ParseErrorKind::TypeMismatch(_)));
    assert!(matches!(parse_err("age add 1").kind, ParseErrorKind::TypeMismatch(_)));
    assert!(matches!(parse_err("not age").kind, ParseErrorKind::TypeMismatch(_)));
    assert!(matches!(parse_err("-name eq 'x'").kind, ParseErrorKind::TypeMismatch(_)));
    assert!(matches!(parse_err("color gt 'Red'").kind, ParseErrorKind::TypeMismatch(_)));
    assert!(matches!(parse_err("contains(age, 'x')").kind, ParseErrorKind::TypeMismatch(_)));
    assert!(matches!(parse_err("items eq 1").kind, ParseErrorKind::TypeMismatch(_)));
    assert!(matches!(parse_err("items/any(i:i/qty)").kind, ParseErrorKind::TypeMismatch(_)));
}

#[test]
fn test_enum_member_checked() {
    assert!(matches!(parse_err("color eq 'Purple'").kind, ParseErrorKind::InvalidLiteral { .. }));
    assert!(matches!(parse_err("'Purple' eq color").kind, ParseErrorKind::TypeMismatch(_)));
}

#[test]
fn test_arity() {
    let err = parse_err("contains(name)");
    assert_eq!(
        err.kind,
        ParseErrorKind::Arity {
            function: "contains",
            expected: "2".to_string(),
            found: 1,
        }
    );
    assert!(matches!(parse_err("substring(name) eq 'x'").kind, ParseErrorKind::Arity { .. }));
}

#[test]
fn test_in_list_errors() {
    assert_eq!(parse_err("age in ()").kind, ParseErrorKind::EmptyList);
    assert_eq!(parse_err("age in (1, null)").kind, ParseErrorKind::NullInList);
    assert!(matches!(parse_err("age in ('a')").kind, ParseErrorKind::TypeMismatch(_)));
}

#[test]
fn test_lambda_variable_errors() {
    assert_eq!(
        parse_err("items/any(name:name/qty gt 1)").kind,
        ParseErrorKind::VariableInUse("name".to_string())
    );
    assert!(matches!(parse_err("items/some(i:true)").kind, ParseErrorKind::UnexpectedToken { .. }));
}

#[test]
fn test_lex_error_becomes_parse_error() {
    let err = parse_err("name eq 'open");
    assert!(matches!(err.kind, ParseErrorKind::Lex(_)));
    assert_eq!(err.offset, 8);
}

#[test]
fn test_depth_limit() {
    let nested = format!("{}true{}", "(".repeat(DEFAULT_MAX_DEPTH + 5), ")".repeat(DEFAULT_MAX_DEPTH + 5));
    assert_eq!(parse_err(&nested).kind, ParseErrorKind::DepthExceeded(DEFAULT_MAX_DEPTH));
}

#[test]
fn test_long_or_chain_is_not_deep() {
    let chain = vec!["age eq 1"; 200].join(" or ");
    parse(&chain);
}

#[test]
fn test_custom_depth() {
    let entity = order_type();
    let allowed = allowed(&entity);
    let mut parser = Parser::new("((true))", &entity, &allowed)
        .unwrap()
        .with_options(ParserOptions { max_depth: 2 });
    assert!(matches!(parser.parse_filter().unwrap_err().kind, ParseErrorKind::DepthExceeded(2)));
}

// ============================================================================
// $compute
// ============================================================================

#[test]
fn test_compute_items() {
    let entity = order_type();
    let items = parse_compute("age add 1 as next_age, name as label", &entity, &allowed(&entity)).unwrap();
    let aliases: Vec<&str> = items.iter().map(|item| item.alias.as_str()).collect();
    assert_eq!(aliases, vec!["next_age", "label"]);
}

#[test]
fn test_compute_errors() {
    let entity = order_type();
    let allowed = allowed(&entity);
    let kind = |text: &str| match parse_compute(text, &entity, &allowed) {
        Err(Error::Parse(e)) => e.kind,
        other => panic!("expected a parse error, got {other:?}"),
    };
    assert_eq!(kind("age as a, name as a"), ParseErrorKind::DuplicateAlias("a".to_string()));
    assert_eq!(kind("age as name"), ParseErrorKind::DuplicateAlias("name".to_string()));
    assert!(matches!(kind("age add 1"), ParseErrorKind::UnexpectedEnd { .. }));
    assert!(matches!(kind("age as 5"), ParseErrorKind::UnexpectedToken { .. }));
}
