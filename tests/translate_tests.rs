mod support;

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use support::{load_catalog, load_registry, load_trace, person_and_address};
use trace2sql::trace::{CompareOp, EntityBinding, Instruction, Literal, TraceBuilder};
use trace2sql::{
    translate, QueryTrace, QuoteStyle, TranslateOptions, TranslationCache, TranslationError,
    Translator,
};

fn selection(build: impl FnOnce(&mut TraceBuilder)) -> Vec<Instruction> {
    let mut builder = TraceBuilder::new();
    build(&mut builder);
    builder.ret();
    builder.build().expect("selection should build")
}

/// A filter whose body jumps to the `no` label on failure.
fn filter(build: impl FnOnce(&mut TraceBuilder)) -> Vec<Instruction> {
    let mut builder = TraceBuilder::new();
    build(&mut builder);
    builder.ret_const(true).label("no").ret_const(false);
    builder.build().expect("filter should build")
}

fn query(
    entities: Vec<EntityBinding>,
    selection: Vec<Instruction>,
    filter: Vec<Instruction>,
) -> QueryTrace {
    QueryTrace {
        entities,
        selection,
        filter,
    }
}

fn person() -> Vec<EntityBinding> {
    vec![EntityBinding::new("p", "person")]
}

fn render(trace: &QueryTrace) -> String {
    let sql = translate(trace, &load_catalog())
        .expect("trace should translate")
        .sql;
    Parser::parse_sql(&PostgreSqlDialect {}, &sql)
        .unwrap_or_else(|e| panic!("rendered SQL should parse: {e}\n{sql}"));
    sql
}

fn translate_err(trace: &QueryTrace) -> TranslationError {
    translate(trace, &load_catalog()).expect_err("translation should fail")
}

#[test]
fn plain_selection_renders_only_select_and_from() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "name");
        }),
        Vec::new(),
    );
    insta::assert_snapshot!(render(&trace), @r#"SELECT "p"."full_name" FROM "person" AS "p""#);
}

#[test]
fn mixed_connectives_keep_their_grouping() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_var("p");
        }),
        filter(|b| {
            b.load_path("p", "given_name")
                .load_const("Ann")
                .compare(CompareOp::Eq)
                .jump_if_true("second")
                .load_path("p", "family_name")
                .load_const("Lee")
                .compare(CompareOp::NotEq)
                .jump_if_false("no")
                .label("second")
                .load_path("p", "given_name")
                .load_const("Bob")
                .compare(CompareOp::NotEq)
                .jump_if_false("no");
        }),
    );
    insta::assert_snapshot!(
        render(&trace),
        @r#"SELECT "p".* FROM "person" AS "p" WHERE ("p"."given_name" = 'Ann' OR "p"."family_name" <> 'Lee') AND "p"."given_name" <> 'Bob'"#
    );
}

#[test]
fn and_under_or_needs_no_parentheses() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "id");
        }),
        filter(|b| {
            b.load_path("p", "age")
                .load_const(18)
                .compare(CompareOp::Lt)
                .jump_if_true("yes")
                .load_path("p", "age")
                .load_const(65)
                .compare(CompareOp::Gt)
                .jump_if_false("no")
                .load_path("p", "family_name")
                .load_const(Literal::Null)
                .compare(CompareOp::IsNot)
                .jump_if_false("no")
                .label("yes");
        }),
    );
    insta::assert_snapshot!(
        render(&trace),
        @r#"SELECT "p"."id" FROM "person" AS "p" WHERE "p"."age" < 18 OR "p"."age" > 65 AND "p"."family_name" IS NOT NULL"#
    );
}

#[test]
fn join_markers_become_joins_in_declaration_order() {
    let entities = vec![
        EntityBinding::new("p", "person"),
        EntityBinding::new("h", "address"),
        EntityBinding::new("w", "address"),
    ];
    let trace = query(
        entities,
        selection(|b| {
            b.load_path("p", "name")
                .load_path("h", "city")
                .load_path("w", "city")
                .build_tuple(3);
        }),
        filter(|b| {
            b.load_global("inner_join")
                .load_path("p", "perm_address_id")
                .load_path("h", "id")
                .call(2)
                .jump_if_false("no")
                .load_global("left_join")
                .load_path("p", "temp_address_id")
                .load_path("w", "id")
                .call(2)
                .jump_if_false("no");
        }),
    );
    insta::assert_snapshot!(
        render(&trace),
        @r#"SELECT "p"."full_name", "h"."city", "w"."city" FROM "person" AS "p" INNER JOIN "address" AS "h" ON "p"."perm_address_id" = "h"."id" LEFT JOIN "address" AS "w" ON "p"."temp_address_id" = "w"."id""#
    );
}

#[test]
fn join_written_from_the_joined_side_is_flipped() {
    let trace = query(
        person_and_address(),
        selection(|b| {
            b.load_path("a", "city");
        }),
        filter(|b| {
            b.load_global("left_join")
                .load_path("a", "id")
                .load_path("p", "address_id")
                .call(2)
                .jump_if_false("no");
        }),
    );
    insta::assert_snapshot!(
        render(&trace),
        @r#"SELECT "a"."city" FROM "person" AS "p" RIGHT JOIN "address" AS "a" ON "p"."address_id" = "a"."id""#
    );
}

#[test]
fn aggregate_conditions_move_to_having() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "family_name")
                .load_global("count")
                .load_var("p")
                .call(1)
                .build_tuple(2);
        }),
        filter(|b| {
            b.load_global("count")
                .load_var("p")
                .call(1)
                .load_const(1)
                .compare(CompareOp::Gt)
                .jump_if_false("no")
                .load_path("p", "age")
                .load_const(18)
                .compare(CompareOp::GtEq)
                .jump_if_false("no");
        }),
    );
    insta::assert_snapshot!(
        render(&trace),
        @r#"SELECT "p"."family_name", COUNT(*) FROM "person" AS "p" WHERE "p"."age" >= 18 GROUP BY "p"."family_name" HAVING COUNT(*) > 1"#
    );
}

#[test]
fn join_marker_under_or_is_rejected() {
    let trace = query(
        person_and_address(),
        selection(|b| {
            b.load_path("p", "name");
        }),
        filter(|b| {
            b.load_global("inner_join")
                .load_path("p", "address_id")
                .load_path("a", "id")
                .call(2)
                .jump_if_true("yes")
                .load_path("a", "city")
                .load_const("Oslo")
                .compare(CompareOp::Eq)
                .jump_if_false("no")
                .label("yes");
        }),
    );
    assert!(matches!(
        translate_err(&trace),
        TranslationError::InvalidJoinUsage(_)
    ));
}

#[test]
fn ordering_markers_fill_order_by() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_global("desc")
                .load_path("p", "age")
                .call(1)
                .load_path("p", "name")
                .build_tuple(2);
        }),
        Vec::new(),
    );
    insta::assert_snapshot!(
        render(&trace),
        @r#"SELECT "p"."age", "p"."full_name" FROM "person" AS "p" ORDER BY "p"."age" DESC"#
    );
}

#[test]
fn date_parts_and_conditional_aggregates() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_global("year")
                .load_path("p", "birth_date")
                .call(1)
                .load_global("count_if")
                .load_var("p")
                .load_path("p", "age")
                .load_const(65)
                .compare(CompareOp::GtEq)
                .call(2)
                .build_tuple(2);
        }),
        filter(|b| {
            b.load_path("p", "birth_date")
                .load_global("now")
                .call(0)
                .compare(CompareOp::Lt)
                .jump_if_false("no");
        }),
    );
    insta::assert_snapshot!(
        render(&trace),
        @r#"SELECT EXTRACT(YEAR FROM "p"."birth_date"), COUNT(*) FILTER (WHERE "p"."age" >= 65) FROM "person" AS "p" WHERE "p"."birth_date" < CURRENT_TIMESTAMP GROUP BY EXTRACT(YEAR FROM "p"."birth_date")"#
    );
}

#[test]
fn clauses_appear_in_fixed_order() {
    let trace = query(
        person_and_address(),
        selection(|b| {
            b.load_global("asc")
                .load_path("a", "city")
                .call(1)
                .load_global("avg")
                .load_path("p", "age")
                .call(1)
                .build_tuple(2);
        }),
        filter(|b| {
            b.load_global("inner_join")
                .load_path("p", "address_id")
                .load_path("a", "id")
                .call(2)
                .jump_if_false("no")
                .load_global("avg")
                .load_path("p", "age")
                .call(1)
                .load_const(30)
                .compare(CompareOp::Gt)
                .jump_if_false("no")
                .load_path("a", "country")
                .load_const("NO")
                .compare(CompareOp::Eq)
                .jump_if_false("no");
        }),
    );
    let sql = render(&trace);
    let positions: Vec<usize> = [
        "SELECT ", " FROM ", " INNER JOIN ", " WHERE ", " GROUP BY ", " HAVING ", " ORDER BY ",
    ]
    .iter()
    .map(|keyword| {
        sql.find(keyword)
            .unwrap_or_else(|| panic!("missing {keyword} in {sql}"))
    })
    .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{sql}");
}

#[test]
fn translation_is_idempotent() {
    let trace = load_trace("names_by_city");
    let catalog = load_catalog();
    let first = translate(&trace, &catalog).expect("trace should translate");
    let second = translate(&trace, &catalog).expect("trace should translate");
    assert_eq!(first.sql, second.sql);
    insta::assert_snapshot!(
        first.sql,
        @r#"SELECT "p"."full_name" FROM "person" AS "p" LEFT JOIN "address" AS "a" ON "p"."address_id" = "a"."id" WHERE "a"."city" = 'Oslo'"#
    );
}

#[test]
fn parameterized_output_collects_literals_after_explicit_parameters() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "name");
        }),
        filter(|b| {
            b.load_path("p", "id")
                .load_global("p_1")
                .compare(CompareOp::Eq)
                .jump_if_false("no")
                .load_path("p", "family_name")
                .load_const("O'Hara")
                .compare(CompareOp::Eq)
                .jump_if_false("no")
                .load_path("p", "age")
                .load_const(40)
                .compare(CompareOp::Lt)
                .jump_if_false("no");
        }),
    );
    let catalog = load_catalog();
    let rendered = Translator::new(&catalog)
        .with_options(TranslateOptions {
            quote: QuoteStyle::Double,
            parameterize: true,
        })
        .translate(&trace)
        .expect("trace should translate");

    insta::assert_snapshot!(
        rendered.sql,
        @r#"SELECT "p"."full_name" FROM "person" AS "p" WHERE "p"."id" = $1 AND "p"."family_name" = $2 AND "p"."age" < $3"#
    );
    assert_eq!(
        rendered.parameters,
        vec![Literal::Str("O'Hara".to_string()), Literal::Int(40)]
    );
}

fn address_ids_in(city: &str) -> QueryTrace {
    query(
        vec![EntityBinding::new("a", "address")],
        selection(|b| {
            b.load_path("a", "id");
        }),
        filter(|b| {
            b.load_path("a", "city")
                .load_const(city)
                .compare(CompareOp::Eq)
                .jump_if_false("no");
        }),
    )
}

#[test]
fn membership_in_a_subquery() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "name");
        }),
        filter(|b| {
            b.load_path("p", "perm_address_id")
                .load_subquery(address_ids_in("London"))
                .compare(CompareOp::In)
                .jump_if_false("no");
        }),
    );
    insta::assert_snapshot!(
        render(&trace),
        @r#"SELECT "p"."full_name" FROM "person" AS "p" WHERE "p"."perm_address_id" IN (SELECT "a"."id" FROM "address" AS "a" WHERE "a"."city" = 'London')"#
    );
}

#[test]
fn subquery_literals_are_numbered_in_reading_order() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "name");
        }),
        filter(|b| {
            b.load_path("p", "given_name")
                .load_const("Ann")
                .compare(CompareOp::Eq)
                .jump_if_false("no")
                .load_path("p", "perm_address_id")
                .load_subquery(address_ids_in("London"))
                .compare(CompareOp::NotIn)
                .jump_if_false("no")
                .load_path("p", "age")
                .load_const(40)
                .compare(CompareOp::Lt)
                .jump_if_false("no");
        }),
    );
    let catalog = load_catalog();
    let rendered = Translator::new(&catalog)
        .with_options(TranslateOptions {
            quote: QuoteStyle::Double,
            parameterize: true,
        })
        .translate(&trace)
        .expect("trace should translate");

    insta::assert_snapshot!(
        rendered.sql,
        @r#"SELECT "p"."full_name" FROM "person" AS "p" WHERE "p"."given_name" = $1 AND "p"."perm_address_id" NOT IN (SELECT "a"."id" FROM "address" AS "a" WHERE "a"."city" = $2) AND "p"."age" < $3"#
    );
    assert_eq!(
        rendered.parameters,
        vec![
            Literal::Str("Ann".to_string()),
            Literal::Str("London".to_string()),
            Literal::Int(40),
        ]
    );
}

#[test]
fn errors_inside_a_subquery_surface() {
    let mut nested = address_ids_in("London");
    nested.entities[0].entity = "ghost".to_string();
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "name");
        }),
        filter(|b| {
            b.load_path("p", "perm_address_id")
                .load_subquery(nested)
                .compare(CompareOp::In)
                .jump_if_false("no");
        }),
    );
    assert_eq!(
        translate_err(&trace),
        TranslationError::UnknownEntity("ghost".to_string())
    );
}

#[test]
fn inline_strings_are_escaped() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "id");
        }),
        filter(|b| {
            b.load_path("p", "family_name")
                .load_const("O'Hara")
                .compare(CompareOp::Eq)
                .jump_if_false("no");
        }),
    );
    assert!(render(&trace).ends_with(r#"WHERE "p"."family_name" = 'O''Hara'"#));
}

#[test]
fn custom_registry_adds_scalar_functions() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_global("initcap").load_path("p", "given_name").call(1);
        }),
        Vec::new(),
    );
    let catalog = load_catalog();
    let registry = load_registry();
    let rendered = Translator::new(&catalog)
        .with_registry(&registry)
        .translate(&trace)
        .expect("trace should translate");
    assert_eq!(
        rendered.sql,
        r#"SELECT initcap("p"."given_name") FROM "person" AS "p""#
    );

    assert!(matches!(
        translate(&trace, &catalog),
        Err(TranslationError::UnsupportedExpression(_))
    ));
}

#[test]
fn cache_returns_the_stored_result() {
    let trace = load_trace("names_by_city");
    let catalog = load_catalog();
    let cache = TranslationCache::new();
    let translator = Translator::new(&catalog).with_cache(&cache);

    let first = translator.translate(&trace).expect("trace should translate");
    let second = translator.translate(&trace).expect("trace should translate");
    assert_eq!(first, second);
    assert_eq!(cache.len(), 1);
}

#[test]
fn unknown_attribute_is_reported() {
    let err = translate_err(&load_trace("unknown_attribute"));
    assert_eq!(
        err,
        TranslationError::UnknownAttribute {
            variable: "p".to_string(),
            attribute: "nickname".to_string(),
        }
    );
}

#[test]
fn second_entity_without_join_is_rejected() {
    let trace = query(
        person_and_address(),
        selection(|b| {
            b.load_path("p", "name");
        }),
        Vec::new(),
    );
    assert!(matches!(
        translate_err(&trace),
        TranslationError::MissingJoinCondition(_)
    ));
}

#[test]
fn aggregate_and_plain_conditions_under_or_are_rejected() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_global("count").load_var("p").call(1);
        }),
        filter(|b| {
            b.load_global("count")
                .load_var("p")
                .call(1)
                .load_const(1)
                .compare(CompareOp::Gt)
                .jump_if_true("yes")
                .load_path("p", "age")
                .load_const(3)
                .compare(CompareOp::Gt)
                .jump_if_false("no")
                .label("yes");
        }),
    );
    assert!(matches!(
        translate_err(&trace),
        TranslationError::UnsupportedMixedAggregate(_)
    ));
}

#[test]
fn constant_filter_is_unreachable() {
    let trace = query(
        person(),
        selection(|b| {
            b.load_path("p", "name");
        }),
        filter(|_| {}),
    );
    assert!(matches!(
        translate_err(&trace),
        TranslationError::UnreachableBlock(_)
    ));
}

#[test]
fn branching_selection_is_malformed() {
    let mut builder = TraceBuilder::new();
    builder
        .load_path("p", "age")
        .jump_if_false("other")
        .load_path("p", "name")
        .ret()
        .label("other")
        .load_path("p", "id")
        .ret();
    let trace = query(
        person(),
        builder.build().expect("selection should build"),
        Vec::new(),
    );
    assert!(matches!(
        translate_err(&trace),
        TranslationError::MalformedTrace(_)
    ));
}
