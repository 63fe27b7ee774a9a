use super::*;
use crate::condition::{Connector, LikeSide};
use crate::connection::{RecordingConnection, ScriptedResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

fn setup() -> (Arc<RecordingConnection>, QueryBuilder) {
    let conn = Arc::new(RecordingConnection::new());
    let qb = QueryBuilder::new(conn.clone());
    (conn, qb)
}

fn builder() -> QueryBuilder {
    setup().1
}

#[test]
fn test_simple_select() {
    let mut qb = builder();
    qb.from("users").unwrap();
    assert_eq!(qb.sql().unwrap(), "SELECT * FROM users");
}

#[test]
fn test_select_fields_and_distinct() {
    let mut qb = builder();
    qb.from("users").unwrap().select("id, name").distinct();
    assert_eq!(qb.sql().unwrap(), "SELECT DISTINCT id, name FROM users");
}

#[test]
fn test_multiple_tables() {
    let mut qb = builder();
    qb.from("users u, posts p").unwrap().select(["u.id", "p.title"]);
    assert_eq!(qb.sql().unwrap(), "SELECT u.id, p.title FROM users u, posts p");
}

#[test]
fn test_without_table() {
    let mut qb = builder();
    qb.without_table().select_raw("1");
    assert_eq!(qb.sql().unwrap(), "SELECT 1");
}

#[test]
fn test_missing_table_is_configuration_error() {
    let mut qb = builder();
    qb.select("id");
    assert!(qb.sql().unwrap_err().is_configuration());

    qb.delete().where_("id", 1).unwrap();
    assert!(qb.sql().unwrap_err().is_configuration());
}

#[test]
fn test_invalid_table_reference() {
    let mut qb = builder();
    assert!(qb.from("users; DROP TABLE x").unwrap_err().is_invalid_operation());
    assert!(qb.from("").unwrap_err().is_invalid_operation());
}

#[test]
fn test_fragment_order_is_independent_of_call_order() {
    let mut a = builder();
    a.from("users u")
        .unwrap()
        .order_by("u.id", Order::Desc)
        .limit(5)
        .offset(10);
    a.where_("u.active", true).unwrap();
    a.left_join("posts p", &[("p.user_id", "u.id")]).unwrap();
    a.group_by("u.id");
    a.having("COUNT(p.id) >", 2).unwrap();
    a.select("u.id").distinct();

    let mut b = builder();
    b.distinct().select("u.id");
    b.having("COUNT(p.id) >", 2).unwrap();
    b.offset(10).limit(5);
    b.group_by("u.id");
    b.from("users u").unwrap();
    b.left_join("posts p", &[("p.user_id", "u.id")]).unwrap();
    b.where_("u.active", true).unwrap();
    b.order_by("u.id", Order::Desc);

    let expected = "SELECT DISTINCT u.id FROM users u LEFT JOIN posts p ON p.user_id = u.id \
                    WHERE u.active = TRUE GROUP BY u.id HAVING COUNT(p.id) > 2 \
                    ORDER BY u.id DESC LIMIT 5 OFFSET 10";
    assert_eq!(a.sql().unwrap(), expected);
    assert_eq!(b.sql().unwrap(), expected);
}

#[test]
fn test_where_connectors() {
    let mut qb = builder();
    qb.from("t").unwrap();
    qb.where_("a", 1).unwrap().or_where("b", 2).unwrap().where_("c", 3).unwrap();
    assert_eq!(qb.sql().unwrap(), "SELECT * FROM t WHERE a = 1 OR b = 2 AND c = 3");
}

#[test]
fn test_where_map_has_one_connector_less_than_entries() {
    let mut qb = builder();
    qb.from("t").unwrap();
    qb.where_map(vec![
        ("a", Value::from(1)),
        ("|b", Value::from(2)),
        ("c >", Value::from(3)),
        ("d", Value::from("x")),
    ])
    .unwrap();
    let sql = qb.sql().unwrap();
    assert_eq!(sql, "SELECT * FROM t WHERE a = 1 OR b = 2 AND c > 3 AND d = 'x'");

    let body = sql.split(" WHERE ").nth(1).unwrap();
    let connectors = body
        .split_whitespace()
        .filter(|w| *w == "AND" || *w == "OR")
        .count();
    assert_eq!(connectors, 3);
    assert!(!body.starts_with("AND") && !body.starts_with("OR"));
}

#[test]
fn test_or_where_map_joins_first_entry_with_or() {
    let mut qb = builder();
    qb.from("t").unwrap().where_("a", 1).unwrap();
    qb.or_where_map([("b", 2), ("c", 3)]).unwrap();
    assert_eq!(qb.sql().unwrap(), "SELECT * FROM t WHERE a = 1 OR b = 2 AND c = 3");
}

#[test]
fn test_or_variants() {
    let mut qb = builder();
    qb.from("people").unwrap();
    qb.where_null("deleted_at").unwrap();
    qb.or_where_not_null("archived_at").unwrap();
    qb.or_where_between("age", 18, 30).unwrap();
    qb.or_where_not_in("id", vec![1, 2]).unwrap();
    qb.or_where_like("name", "bo").unwrap();
    qb.or_where_not("status", "banned").unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM people WHERE deleted_at IS NULL OR archived_at IS NOT NULL \
         OR age BETWEEN 18 AND 30 OR id NOT IN (1,2) OR name LIKE '%bo%' OR status != 'banned'"
    );
}

#[test]
fn test_where_raw_and_expr() {
    let mut qb = builder();
    qb.from("t").unwrap();
    qb.where_raw("a > b + 1").unwrap();
    qb.where_expr("updated_at >", "created_at").unwrap();
    qb.or_where_raw("c IS NULL").unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM t WHERE a > b + 1 AND updated_at > created_at OR c IS NULL"
    );
}

#[test]
fn test_like_forms_are_equivalent() {
    let mut a = builder();
    a.from("users").unwrap().where_like("name", "%abc%").unwrap();
    let mut b = builder();
    b.from("users")
        .unwrap()
        .where_like_side("name", "abc", LikeSide::Both)
        .unwrap();
    let sql = a.sql().unwrap();
    assert_eq!(sql, "SELECT * FROM users WHERE name LIKE '%abc%'");
    assert_eq!(sql, b.sql().unwrap());
}

#[test]
fn test_like_variants() {
    let mut qb = builder();
    qb.from("users").unwrap();
    qb.where_ilike("name", "AbC", LikeSide::After).unwrap();
    qb.where_not_like("email", "test", LikeSide::Before).unwrap();
    qb.or_where_like_side("nick", "x", LikeSide::None).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM users WHERE LOWER(name) LIKE 'abc%' AND email NOT LIKE '%test' OR nick LIKE 'x'"
    );
}

#[test]
fn test_like_wildcards_are_added_per_side() {
    let mut qb = builder();
    qb.from("rates").unwrap();
    qb.where_like_side("rate", "50%", LikeSide::Before).unwrap();
    qb.where_like("label", "100%").unwrap();
    qb.where_like_side("code", "a%b", LikeSide::After).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM rates WHERE rate LIKE '%50%' AND label LIKE '%100%' AND code LIKE 'a%b%'"
    );
}

#[test]
fn test_where_in_forms() {
    let mut qb = builder();
    qb.from("t").unwrap();
    qb.where_in("id", 5).unwrap();
    qb.where_in("code", ["a", "b"]).unwrap();
    qb.where_in("other", Vec::<i64>::new()).unwrap();
    qb.where_not_in("gone", Vec::<i64>::new()).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM t WHERE id IN (5) AND code IN ('a','b') AND 1=0 AND 1=1"
    );
}

#[test]
fn test_where_in_sub_callback_gets_a_clone() {
    let mut qb = builder();
    qb.from("users").unwrap().where_("active", true).unwrap();
    qb.where_in_sub("id", |sub| {
        sub.from("orders")?.select("user_id").where_("total >", 100)?;
        sub.limit(3);
        Ok(())
    })
    .unwrap();

    let state = qb.snapshot();
    assert_eq!(state.tables(), ["users".to_string()]);
    assert_eq!(state.limit, None);
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM users WHERE active = TRUE AND id IN (SELECT user_id FROM orders WHERE total > 100 LIMIT 3)"
    );
}

#[test]
fn test_where_not_in_sub() {
    let mut qb = builder();
    qb.from("users").unwrap();
    qb.where_not_in_sub("id", |sub| {
        sub.from("bans")?.select("user_id");
        Ok(())
    })
    .unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM users WHERE id NOT IN (SELECT user_id FROM bans)"
    );
}

#[test]
fn test_subquery_self_reference_is_rejected() {
    let mut qb = builder();
    qb.from("users").unwrap();
    let sub = qb.subquery().unwrap();
    assert_eq!(sub.origin(), Some(qb.id()));

    qb.from("posts").unwrap();
    let err = qb.from_subquery(sub.clone(), "x").unwrap_err();
    assert!(err.is_invalid_operation());
    let err = qb.where_in_subquery("id", sub.clone()).unwrap_err();
    assert!(err.is_invalid_operation());

    let mut other = qb.fresh();
    other.from_subquery(sub, "u").unwrap();
    assert_eq!(other.sql().unwrap(), "SELECT * FROM (SELECT * FROM users) u");
}

#[test]
fn test_from_subquery_with() {
    let mut qb = builder();
    qb.from_subquery_with("recent", |sub| {
        sub.from("posts")?.order_by("created_at", Order::Desc).limit(10);
        Ok(())
    })
    .unwrap()
    .select("recent.id");
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT recent.id FROM (SELECT * FROM posts ORDER BY created_at DESC LIMIT 10) recent"
    );
}

#[test]
fn test_empty_subquery_is_rejected() {
    let mut qb = builder();
    let err = qb
        .from_subquery_with("x", |_| Ok(()))
        .unwrap_err();
    assert!(err.is_invalid_operation());
}

#[test]
fn test_join_types() {
    assert_eq!("left outer".parse::<JoinType>().unwrap(), JoinType::LeftOuter);
    assert_eq!("FULL".parse::<JoinType>().unwrap(), JoinType::FullOuter);
    assert_eq!("inner join".parse::<JoinType>().unwrap(), JoinType::Inner);
    assert!("sideways".parse::<JoinType>().is_err());

    let mut qb = builder();
    qb.from("users").unwrap();
    qb.join_kind("posts p", &[("p.user_id", "users.id")], "left outer")
        .unwrap();
    qb.join_kind("roles r", &[("r.id", "users.role_id"), ("r.active", "users.active")], "right")
        .unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM users LEFT OUTER JOIN posts p ON p.user_id = users.id \
         RIGHT JOIN roles r ON r.id = users.role_id AND r.active = users.active"
    );

    let mut qb = builder();
    qb.from("users").unwrap();
    assert!(qb.join_kind("posts", &[("a", "b")], "sideways").unwrap_err().is_invalid_operation());
    assert!(qb.inner_join("posts", &[]).unwrap_err().is_invalid_operation());
}

#[test]
fn test_join_resolves_prefix_and_aliases() {
    let conn = Arc::new(RecordingConnection::new().with_prefix("app_"));
    let mut qb = QueryBuilder::new(conn);
    qb.from("users u").unwrap();
    qb.inner_join("posts", &[("posts.user_id", "users.id")]).unwrap();
    qb.full_join("tags t", &[("t.post_id", "posts.id")]).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM app_users u INNER JOIN app_posts ON app_posts.user_id = u.id \
         FULL OUTER JOIN app_tags t ON t.post_id = app_posts.id"
    );
}

fn prefixed() -> QueryBuilder {
    QueryBuilder::new(Arc::new(RecordingConnection::new().with_prefix("app_")))
}

#[test]
fn test_self_join_keeps_both_aliases() {
    let mut qb = prefixed();
    qb.from("users a").unwrap();
    qb.left_join("users b", &[("a.manager_id", "b.id")]).unwrap();
    qb.select("a.name, b.name");
    qb.where_("users.active", true).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT a.name, b.name FROM app_users a LEFT JOIN app_users b ON a.manager_id = b.id \
         WHERE a.active = TRUE"
    );
}

#[test]
fn test_subquery_callback_keeps_outer_aliases() {
    let mut qb = prefixed();
    qb.from("users u").unwrap();
    qb.where_in_sub("u.id", |sub| {
        sub.from("users")?
            .select("users.id")
            .where_("users.active", true)?;
        Ok(())
    })
    .unwrap();
    qb.where_("u.name", "x").unwrap();
    qb.where_("users.age >", 3).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM app_users u WHERE u.id IN \
         (SELECT app_users.id FROM app_users WHERE app_users.active = TRUE) \
         AND u.name = 'x' AND u.age > 3"
    );
}

#[test]
fn test_subquery_aliases_stay_inside_the_subquery() {
    let mut qb = prefixed();
    qb.from("users u").unwrap();
    qb.where_not_in_sub("u.id", |sub| {
        sub.from("orders o")?
            .select("o.user_id")
            .where_("o.total >", 100)?;
        Ok(())
    })
    .unwrap();
    qb.select("orders.id");
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT app_orders.id FROM app_users u WHERE u.id NOT IN \
         (SELECT o.user_id FROM app_orders o WHERE o.total > 100)"
    );
}

#[test]
fn test_derived_table_alias_is_not_prefixed() {
    let mut qb = prefixed();
    qb.from_subquery_with("s", |sub| {
        sub.from("orders")?.select("user_id");
        Ok(())
    })
    .unwrap();
    qb.where_("s.user_id >", 1).unwrap();
    qb.order_by("s.user_id", Order::Asc);
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM (SELECT user_id FROM app_orders) s WHERE s.user_id > 1 ORDER BY s.user_id ASC"
    );
}

#[test]
fn test_where_group_sees_outer_aliases() {
    let mut qb = prefixed();
    qb.from("users u").unwrap();
    qb.where_group(|g| {
        g.where_("users.role", "admin")?.or_where("u.role", "owner")?;
        Ok(())
    })
    .unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM app_users u WHERE (u.role = 'admin' OR u.role = 'owner')"
    );
}

#[test]
fn test_aliases_end_with_the_statement() {
    let mut qb = prefixed();
    qb.from("users u").unwrap();
    let mut other = qb.fresh();
    other.from("posts").unwrap().select("users.id");
    assert_eq!(other.sql().unwrap(), "SELECT app_users.id FROM app_posts");

    qb.sql().unwrap();
    qb.from("users").unwrap().select("users.id");
    assert_eq!(qb.sql().unwrap(), "SELECT app_users.id FROM app_users");
}

#[test]
fn test_join_raw() {
    let mut qb = builder();
    qb.from("users u").unwrap();
    qb.join_raw("posts p", "p.user_id = u.id AND p.published = TRUE", JoinType::Left)
        .unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM users u LEFT JOIN posts p ON p.user_id = u.id AND p.published = TRUE"
    );
}

#[test]
fn test_read_clauses_force_select() {
    let mut qb = builder();
    qb.from("t").unwrap().insert([("a", 1)]).unwrap();
    assert_eq!(qb.mode(), CrudMode::Insert);
    qb.order_by("a", Order::Asc);
    assert_eq!(qb.mode(), CrudMode::Select);
    assert_eq!(qb.sql().unwrap(), "SELECT * FROM t ORDER BY a ASC");

    let forcing: [fn(&mut QueryBuilder); 6] = [
        |q: &mut QueryBuilder| {
            q.distinct();
        },
        |q: &mut QueryBuilder| {
            q.select("a");
        },
        |q: &mut QueryBuilder| {
            q.group_by("a");
        },
        |q: &mut QueryBuilder| {
            q.offset(1);
        },
        |q: &mut QueryBuilder| {
            q.having("a", 1).unwrap();
        },
        |q: &mut QueryBuilder| {
            q.inner_join("u", &[("u.id", "t.u_id")]).unwrap();
        },
    ];
    for force in forcing {
        let mut qb = builder();
        qb.from("t").unwrap().update([("a", 1)]).unwrap();
        force(&mut qb);
        assert_eq!(qb.mode(), CrudMode::Select);
    }
}

#[test]
fn test_where_from_and_limit_keep_write_mode() {
    let conn = Arc::new(RecordingConnection::new().with_limited_delete(true));
    let mut qb = QueryBuilder::new(conn);
    qb.delete();
    qb.from("sessions").unwrap().where_("expired", true).unwrap().limit(100);
    assert_eq!(qb.mode(), CrudMode::Delete);
    assert_eq!(
        qb.sql().unwrap(),
        "DELETE FROM sessions WHERE expired = TRUE LIMIT 100"
    );
}

#[test]
fn test_insert() {
    let mut qb = builder();
    qb.from("t")
        .unwrap()
        .insert([("a", Value::from(1)), ("b", Value::from("x"))])
        .unwrap();
    assert_eq!(qb.sql().unwrap(), "INSERT INTO t (a,b) VALUES (1,'x')");
}

#[test]
fn test_insert_rejects_empty_record() {
    let mut qb = builder();
    qb.from("t").unwrap();
    assert!(qb.insert(Vec::<(&str, Value)>::new()).unwrap_err().is_invalid_operation());
    assert!(qb.insert(json!([1, 2])).unwrap_err().is_invalid_operation());
}

#[test]
fn test_insert_batch() {
    let mut qb = builder();
    qb.from("t")
        .unwrap()
        .insert_batch(vec![json!({"a": 1, "b": "x"}), json!({"b": "y", "a": 2})])
        .unwrap();
    assert_eq!(qb.sql().unwrap(), "INSERT INTO t (a,b) VALUES (1,'x'),(2,'y')");
}

#[test]
fn test_insert_batch_must_be_tabular() {
    let mut qb = builder();
    qb.from("t").unwrap();
    let err = qb
        .insert_batch(vec![json!({"a": 1}), json!({"b": 2})])
        .unwrap_err();
    assert!(err.is_invalid_operation());
    let err = qb
        .insert_batch(vec![json!({"a": 1}), json!({"a": 1, "b": 2})])
        .unwrap_err();
    assert!(err.is_invalid_operation());
    let err = qb.insert_batch(Vec::<serde_json::Value>::new()).unwrap_err();
    assert!(err.is_invalid_operation());
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct NewUser {
    name: String,
    age: i32,
}

#[test]
fn test_insert_json() {
    let mut qb = builder();
    let user = NewUser {
        name: "ann".into(),
        age: 30,
    };
    qb.from("users").unwrap().insert_json(&user).unwrap();
    assert_eq!(qb.sql().unwrap(), "INSERT INTO users (name,age) VALUES ('ann',30)");

    let users = vec![
        NewUser {
            name: "a".into(),
            age: 1,
        },
        NewUser {
            name: "b".into(),
            age: 2,
        },
    ];
    qb.from("users").unwrap().insert_json(&users).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "INSERT INTO users (name,age) VALUES ('a',1),('b',2)"
    );

    assert!(qb.insert_json(&5).unwrap_err().is_invalid_operation());
}

#[test]
fn test_update() {
    let mut qb = builder();
    qb.from("users")
        .unwrap()
        .update([("name", Value::from("bob")), ("age", Value::from(31))])
        .unwrap()
        .where_("id", 7)
        .unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "UPDATE users SET name = 'bob', age = 31 WHERE id = 7"
    );

    qb.from("pages").unwrap().update_raw("hits = hits + 1").where_("id", 1).unwrap();
    assert_eq!(qb.sql().unwrap(), "UPDATE pages SET hits = hits + 1 WHERE id = 1");

    qb.from("users").unwrap();
    assert!(qb.update(Vec::<(&str, Value)>::new()).unwrap_err().is_invalid_operation());
}

#[test]
fn test_update_quotes_null_and_json() {
    let mut qb = builder();
    qb.from("users")
        .unwrap()
        .update(json!({"nick": null, "meta": {"k": "v"}}))
        .unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        r#"UPDATE users SET nick = NULL, meta = '{"k":"v"}'"#
    );
}

#[test]
fn test_delete() {
    let mut qb = builder();
    qb.from("users").unwrap().delete().where_("id", 1).unwrap();
    assert_eq!(qb.sql().unwrap(), "DELETE FROM users WHERE id = 1");
}

#[test]
fn test_limited_delete_needs_support() {
    let mut qb = builder();
    qb.from("users").unwrap().delete().limit(5);
    assert!(qb.sql().unwrap_err().is_unsupported());
}

#[test]
fn test_write_needs_a_single_table() {
    let mut qb = builder();
    qb.from("a, b").unwrap().delete();
    assert!(qb.sql().unwrap_err().is_invalid_operation());
}

#[test]
fn test_sql_resets_state() {
    let mut qb = builder();
    qb.from("users").unwrap().where_("id", 1).unwrap().delete();
    assert_eq!(qb.sql().unwrap(), "DELETE FROM users WHERE id = 1");
    assert_eq!(qb.sql().unwrap(), "");
    assert_eq!(qb.mode(), CrudMode::Select);
}

#[test]
fn test_clone_is_a_fresh_builder() {
    let mut qb = builder();
    qb.from("users").unwrap().where_("a", 1).unwrap();
    let clone = qb.clone();
    assert!(clone.snapshot().is_pristine());
    assert_ne!(clone.id(), qb.id());
    assert_eq!(qb.sql().unwrap(), "SELECT * FROM users WHERE a = 1");
}

#[test]
fn test_snapshot_and_restore() {
    let mut qb = builder();
    qb.from("users").unwrap().where_("a", 1).unwrap().limit(2);
    let snapshot = qb.snapshot();
    let first = qb.sql().unwrap();
    qb.restore(snapshot);
    assert_eq!(qb.sql().unwrap(), first);
}

#[test]
fn test_paginate() {
    let mut qb = builder();
    qb.from("t").unwrap().paginate(3, 20);
    assert_eq!(qb.sql().unwrap(), "SELECT * FROM t LIMIT 20 OFFSET 40");
    qb.from("t").unwrap().paginate(0, 10);
    assert_eq!(qb.sql().unwrap(), "SELECT * FROM t LIMIT 10 OFFSET 0");
}

#[test]
fn test_where_group() {
    let mut qb = builder();
    qb.from("users").unwrap().where_("active", true).unwrap();
    qb.or_where_group(|g| {
        g.where_("role", "admin")?.where_("verified", true)?;
        Ok(())
    })
    .unwrap();
    qb.where_group(|_| Ok(())).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM users WHERE active = TRUE OR (role = 'admin' AND verified = TRUE)"
    );
}

#[test]
fn test_having_family() {
    let mut qb = builder();
    qb.from("orders").unwrap().select("status, COUNT(*) AS n");
    qb.group_by("status");
    qb.having("COUNT(*) >", 1).unwrap();
    qb.having_in("status", ["new", "paid"]).unwrap();
    qb.or_having("SUM(total) >=", 1000).unwrap();
    qb.having_not_null("status").unwrap();
    qb.having_between("MAX(total)", 10, 20).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT status, COUNT(*) AS n FROM orders GROUP BY status HAVING COUNT(*) > 1 \
         AND status IN ('new','paid') OR SUM(total) >= 1000 AND status IS NOT NULL \
         AND MAX(total) BETWEEN 10 AND 20"
    );
}

#[test]
fn test_having_in_sub_and_like() {
    let mut qb = builder();
    qb.from("orders").unwrap().group_by("customer_id");
    qb.having_in_sub("customer_id", |sub| {
        sub.from("vip").unwrap().select("id");
        Ok(())
    })
    .unwrap();
    qb.having_like("MAX(note)", "rush", LikeSide::After).unwrap();
    qb.having_null("MIN(cancelled_at)").unwrap();
    qb.having_not_in("customer_id", vec![0]).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM orders GROUP BY customer_id HAVING customer_id IN (SELECT id FROM vip) \
         AND MAX(note) LIKE 'rush%' AND MIN(cancelled_at) IS NULL AND customer_id NOT IN (0)"
    );
}

#[test]
fn test_where_by_name() {
    let mut qb = builder();
    qb.from("users").unwrap();
    qb.where_by_name(
        "whereFirstNameAndAgeOrEmail",
        vec![Value::from("ann"), Value::from(30), Value::from("a@x.io")],
    )
    .unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM users WHERE first_name = 'ann' AND age = 30 OR email = 'a@x.io'"
    );

    qb.from("users").unwrap();
    let err = qb.where_by_name("whereNameAndAge", ["only one"]).unwrap_err();
    assert!(err.is_invalid_operation());
    let err = qb.where_by_name("whereName", ["a", "b"]).unwrap_err();
    assert!(err.is_invalid_operation());
}

#[test]
fn test_having_by_name() {
    let mut qb = builder();
    qb.from("orders").unwrap().group_by("status");
    qb.where_by_name("orHavingStatus", ["paid"]).unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM orders GROUP BY status HAVING status = 'paid'"
    );
}

#[test]
fn test_condition_from_name() {
    let mut qb = builder();
    qb.from("users").unwrap().where_("x", 1).unwrap();
    qb.condition_from_name("StatusOrRole", Connector::Or, ["a", "b"])
        .unwrap();
    assert_eq!(
        qb.sql().unwrap(),
        "SELECT * FROM users WHERE x = 1 OR status = 'a' OR role = 'b'"
    );
}

// ==================== Execution ====================

#[test]
fn test_execute_runs_compiled_sql_and_resets() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::rows(
        ["id"],
        vec![vec![Value::Int(1)], vec![Value::Int(2)]],
    ));
    qb.from("users").unwrap().where_("active", true).unwrap();
    let rows = qb.all().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        conn.executed(),
        ["SELECT * FROM users WHERE active = TRUE"]
    );
    assert!(qb.snapshot().is_pristine());
}

#[test]
fn test_execute_empty_statement_is_invalid() {
    let (conn, mut qb) = setup();
    assert!(qb.execute().unwrap_err().is_invalid_operation());
    assert!(conn.executed().is_empty());
}

#[test]
fn test_driver_errors_pass_through() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::Error("relation \"nope\" does not exist".into()));
    qb.from("nope").unwrap();
    let err = qb.execute().unwrap_err();
    assert!(err.is_driver());
    assert_eq!(err.to_string(), "relation \"nope\" does not exist");
}

#[test]
fn test_first_limits_to_one_row() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::rows(["id"], vec![vec![Value::Int(9)]]));
    qb.from("users").unwrap().order_by("id", Order::Desc);
    let row = qb.first().unwrap().unwrap();
    assert_eq!(row.try_get::<i64>("id").unwrap(), 9);
    assert_eq!(conn.last_sql().unwrap(), "SELECT * FROM users ORDER BY id DESC LIMIT 1");

    qb.from("users").unwrap().limit(3);
    assert!(qb.first().unwrap().is_none());
    assert_eq!(conn.last_sql().unwrap(), "SELECT * FROM users LIMIT 3");
}

#[test]
fn test_row_and_value() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::rows(
        ["name"],
        vec![vec![Value::from("a")], vec![Value::from("b")]],
    ));
    qb.from("users").unwrap();
    let row = qb.row(1).unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&Value::from("b")));

    conn.push(ScriptedResult::scalar("name", "ann"));
    qb.from("users").unwrap().select("name");
    assert_eq!(qb.value().unwrap(), Some(Value::from("ann")));
}

#[test]
fn test_get_as() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::rows(
        ["name", "age"],
        vec![vec![Value::from("ann"), Value::Int(30)]],
    ));
    qb.from("users").unwrap();
    let users: Vec<NewUser> = qb.get_as().unwrap();
    assert_eq!(
        users,
        vec![NewUser {
            name: "ann".into(),
            age: 30
        }]
    );
}

#[test]
fn test_count_plain() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::scalar("aggregate", 12));
    qb.from("users")
        .unwrap()
        .where_("active", true)
        .unwrap()
        .order_by("id", Order::Asc);
    assert_eq!(qb.count("*").unwrap(), 12);
    assert_eq!(
        conn.last_sql().unwrap(),
        "SELECT COUNT(*) AS aggregate FROM users WHERE active = TRUE"
    );
}

#[test]
fn test_count_after_distinct_uses_derived_table() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::scalar("aggregate", 4));
    qb.from("users").unwrap().select("users.email").distinct();
    assert_eq!(qb.count("users.email").unwrap(), 4);
    assert_eq!(
        conn.last_sql().unwrap(),
        "SELECT COUNT(email) AS aggregate FROM (SELECT DISTINCT users.email FROM users) count_table"
    );
}

#[test]
fn test_count_after_group_or_limit_uses_derived_table() {
    let (conn, mut qb) = setup();
    qb.from("users").unwrap().group_by("status");
    assert_eq!(qb.count("").unwrap(), 0);
    qb.from("users").unwrap().limit(10).offset(20);
    qb.count("*").unwrap();
    assert_eq!(
        conn.executed(),
        [
            "SELECT COUNT(*) AS aggregate FROM (SELECT * FROM users GROUP BY status) count_table",
            "SELECT COUNT(*) AS aggregate FROM (SELECT * FROM users LIMIT 10 OFFSET 20) count_table",
        ]
    );
}

#[test]
fn test_count_reads_text_numbers() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::scalar("aggregate", "17"));
    qb.from("users").unwrap();
    assert_eq!(qb.count("*").unwrap(), 17);
}

#[test]
fn test_sum_avg_min_max() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::scalar("aggregate", 10.5));
    qb.from("orders").unwrap();
    assert_eq!(qb.sum::<f64>("total").unwrap(), Some(10.5));
    assert_eq!(conn.last_sql().unwrap(), "SELECT SUM(total) AS aggregate FROM orders");

    conn.push(ScriptedResult::scalar("aggregate", 3));
    qb.from("orders").unwrap().where_("status", "paid").unwrap();
    assert_eq!(qb.min::<i64>("qty").unwrap(), Some(3));
    assert_eq!(
        conn.last_sql().unwrap(),
        "SELECT MIN(qty) AS aggregate FROM orders WHERE status = 'paid'"
    );

    conn.push(ScriptedResult::scalar("aggregate", Value::Null));
    qb.from("orders").unwrap();
    assert_eq!(qb.avg::<f64>("total").unwrap(), None);

    qb.from("orders").unwrap();
    assert_eq!(qb.max::<i64>("qty").unwrap(), None);
    assert!(qb.max::<i64>(" ").unwrap_err().is_invalid_operation());
}

#[test]
fn test_aggregate_decode_error() {
    let (conn, mut qb) = setup();
    conn.push(ScriptedResult::scalar("aggregate", "abc"));
    qb.from("orders").unwrap();
    let err = qb.sum::<i64>("total").unwrap_err();
    assert!(matches!(err, crate::QbError::Decode { .. }));
}

#[test]
fn test_query_raw() {
    let (conn, qb) = setup();
    conn.push(ScriptedResult::write(3));
    let rs = qb.query_raw("UPDATE t SET a = 1", &[]).unwrap();
    assert_eq!(rs.affected_rows(), 3);
    assert_eq!(rs.sql(), "UPDATE t SET a = 1");
}
