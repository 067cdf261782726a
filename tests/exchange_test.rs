use fast_exchange_router::exchange::{Exchange, ExchangeType};
use fast_exchange_router::filter::{JMS_SELECTOR_ARGUMENT, NO_LOCAL_ARGUMENT};
use fast_exchange_router::message::{Headers, InstanceProperties, Message, Value};
use fast_exchange_router::queue::{QueueRef, StandardQueue};
use fast_exchange_router::RoutingError;
use std::sync::Arc;

fn queue(name: &str) -> QueueRef {
    Arc::new(StandardQueue::new(name))
}

fn args(pairs: &[(&str, Value)]) -> Headers {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn selector(expr: &str) -> Headers {
    args(&[(JMS_SELECTOR_ARGUMENT, Value::from(expr))])
}

fn route(exchange: &Exchange, message: &Message) -> Vec<String> {
    exchange
        .route(message, &InstanceProperties::default())
        .iter()
        .map(|q| q.name().to_string())
        .collect()
}

fn with_key(routing_key: &str) -> Message {
    Message::builder().routing_key(routing_key).build()
}

#[test]
fn test_fanout_filtered_scenario() {
    let exchange = Exchange::new("fanout", ExchangeType::Fanout);
    exchange.bind(queue("A"), "", Headers::new()).unwrap();
    exchange.bind(queue("B"), "", selector("x = 1")).unwrap();
    exchange.bind(queue("C"), "", selector("x = 2")).unwrap();

    let x1 = Message::builder().header("x", 1).build();
    let x9 = Message::builder().header("x", 9).build();
    assert_eq!(route(&exchange, &x1), vec!["A", "B"]);
    assert_eq!(route(&exchange, &x9), vec!["A"]);

    exchange.unbind("A", "").unwrap();
    assert_eq!(route(&exchange, &x1), vec!["B"]);
}

#[test]
fn test_fanout_ignores_routing_key() {
    let exchange = Exchange::new("fanout", ExchangeType::Fanout);
    exchange.bind(queue("a"), "ignored", Headers::new()).unwrap();
    exchange.bind(queue("b"), "", Headers::new()).unwrap();
    assert_eq!(route(&exchange, &with_key("anything")), vec!["a", "b"]);
}

#[test]
fn test_unfiltered_before_filtered() {
    let exchange = Exchange::new("fanout", ExchangeType::Fanout);
    exchange.bind(queue("filtered"), "", selector("x = 1")).unwrap();
    exchange.bind(queue("plain"), "", Headers::new()).unwrap();

    let message = Message::builder().header("x", 1).build();
    assert_eq!(route(&exchange, &message), vec!["plain", "filtered"]);
}

#[test]
fn test_direct_routes_on_exact_key() {
    let exchange = Exchange::new("direct", ExchangeType::Direct);
    let q = queue("q");
    exchange.bind(q.clone(), "red", Headers::new()).unwrap();
    exchange.bind(q, "green", Headers::new()).unwrap();
    exchange.bind(queue("other"), "red", selector("size > 10")).unwrap();

    assert_eq!(route(&exchange, &with_key("red")), vec!["q"]);
    assert_eq!(route(&exchange, &with_key("green")), vec!["q"]);
    assert!(route(&exchange, &with_key("blue")).is_empty());

    let big = Message::builder().routing_key("red").header("size", 20).build();
    assert_eq!(route(&exchange, &big), vec!["q", "other"]);
}

#[test]
fn test_topic_wildcards_and_dedup() {
    let exchange = Exchange::new("topic", ExchangeType::Topic);
    let all = queue("all");
    exchange.bind(all.clone(), "stock.#", Headers::new()).unwrap();
    exchange.bind(all, "stock.*.nyse", Headers::new()).unwrap();
    exchange.bind(queue("nyse"), "*.*.nyse", Headers::new()).unwrap();
    exchange.bind(queue("bonds"), "bond.#", Headers::new()).unwrap();

    // Partitions are visited in pattern order; "all" matches through two.
    assert_eq!(route(&exchange, &with_key("stock.usd.nyse")), vec!["nyse", "all"]);
    assert_eq!(route(&exchange, &with_key("stock")), vec!["all"]);
    assert_eq!(route(&exchange, &with_key("bond.eu")), vec!["bonds"]);
    assert!(route(&exchange, &with_key("fx.usd")).is_empty());
}

#[test]
fn test_topic_equivalent_patterns_share_partition() {
    let exchange = Exchange::new("topic", ExchangeType::Topic);
    exchange.bind(queue("a"), "a.#.#", Headers::new()).unwrap();
    exchange.bind(queue("b"), "a.#", Headers::new()).unwrap();

    let snapshot = exchange.snapshot();
    assert_eq!(snapshot.partitions().len(), 1);
    assert_eq!(
        snapshot.partition("a.#").unwrap().unfiltered_queues(),
        vec!["a", "b"]
    );
}

#[test]
fn test_topic_rejects_malformed_pattern() {
    let exchange = Exchange::new("topic", ExchangeType::Topic);
    let err = exchange.bind(queue("q"), "stock.us*", Headers::new()).unwrap_err();
    assert!(matches!(err, RoutingError::InvalidBindingKey { .. }));
    assert!(exchange.bindings().is_empty());
}

#[test]
fn test_headers_exchange() {
    let exchange = Exchange::new("headers", ExchangeType::Headers);
    exchange
        .bind(
            queue("pdf-reports"),
            "",
            args(&[
                ("x-match", Value::from("all")),
                ("format", Value::from("pdf")),
                ("type", Value::from("report")),
            ]),
        )
        .unwrap();
    exchange
        .bind(
            queue("any-pdf-or-log"),
            "",
            args(&[
                ("x-match", Value::from("any")),
                ("format", Value::from("pdf")),
                ("type", Value::from("log")),
            ]),
        )
        .unwrap();

    let report = Message::builder().header("format", "pdf").header("type", "report").build();
    let log = Message::builder().header("format", "zip").header("type", "log").build();
    let other = Message::builder().header("format", "zip").build();

    assert_eq!(route(&exchange, &report), vec!["pdf-reports", "any-pdf-or-log"]);
    assert_eq!(route(&exchange, &log), vec!["any-pdf-or-log"]);
    assert!(route(&exchange, &other).is_empty());
    assert!(exchange.binding("pdf-reports", "").unwrap().is_filtered());
}

#[test]
fn test_headers_combined_with_selector() {
    let exchange = Exchange::new("headers", ExchangeType::Headers);
    exchange
        .bind(
            queue("big-eu"),
            "",
            args(&[
                ("region", Value::from("eu")),
                (JMS_SELECTOR_ARGUMENT, Value::from("amount > 100")),
            ]),
        )
        .unwrap();

    let big_eu = Message::builder().header("region", "eu").header("amount", 500).build();
    let small_eu = Message::builder().header("region", "eu").header("amount", 5).build();
    let big_us = Message::builder().header("region", "us").header("amount", 500).build();

    assert_eq!(route(&exchange, &big_eu), vec!["big-eu"]);
    assert!(route(&exchange, &small_eu).is_empty());
    assert!(route(&exchange, &big_us).is_empty());
}

#[test]
fn test_headers_binding_without_headers_is_unfiltered() {
    let exchange = Exchange::new("headers", ExchangeType::Headers);
    exchange.bind(queue("everything"), "", Headers::new()).unwrap();
    assert!(!exchange.binding("everything", "").unwrap().is_filtered());
    assert_eq!(route(&exchange, &with_key("x")), vec!["everything"]);
}

#[test]
fn test_no_local_filters_owner_messages() {
    let exchange = Exchange::new("fanout", ExchangeType::Fanout);
    let owned: QueueRef = Arc::new(StandardQueue::with_owner("owned", Some("conn-1".into())));
    exchange
        .bind(owned, "", args(&[(NO_LOCAL_ARGUMENT, Value::Bool(true))]))
        .unwrap();

    let own = Message::builder().origin("conn-1").build();
    let foreign = Message::builder().origin("conn-2").build();
    assert!(route(&exchange, &own).is_empty());
    assert_eq!(route(&exchange, &foreign), vec!["owned"]);
}

#[test]
fn test_no_local_without_owner_is_unfiltered() {
    let exchange = Exchange::new("fanout", ExchangeType::Fanout);
    exchange
        .bind(queue("shared"), "", args(&[(NO_LOCAL_ARGUMENT, Value::Bool(true))]))
        .unwrap();
    assert!(!exchange.binding("shared", "").unwrap().is_filtered());
}

#[test]
fn test_selector_on_jms_headers() {
    let exchange = Exchange::new("fanout", ExchangeType::Fanout);
    exchange
        .bind(queue("urgent"), "", selector("JMSPriority > 6 AND JMSRedelivered = FALSE"))
        .unwrap();

    let urgent = Message::builder().priority(9).build();
    let normal = Message::builder().build();
    assert_eq!(route(&exchange, &urgent), vec!["urgent"]);
    assert!(route(&exchange, &normal).is_empty());

    let redelivered = InstanceProperties {
        persistent: None,
        redelivered: true,
    };
    assert!(exchange.route(&urgent, &redelivered).is_empty());
}

#[test]
fn test_oversized_selector_fails_to_bind() {
    let exchange = Exchange::new("fanout", ExchangeType::Fanout);
    let chain = vec!["x = 1"; 20_000].join(" AND ");
    let err = exchange.bind(queue("deep"), "", selector(&chain)).unwrap_err();
    assert!(matches!(err, RoutingError::FilterCompilation { .. }));
    assert!(exchange.bindings().is_empty());

    let message = Message::builder().header("x", 1).build();
    assert!(route(&exchange, &message).is_empty());

    let chain = vec!["x = 1"; 200].join(" AND ");
    exchange.bind(queue("wide"), "", selector(&chain)).unwrap();
    assert_eq!(route(&exchange, &message), vec!["wide"]);
}
