use futuresbot::config::BotConfig;
use futuresbot::exchange::{BinanceConfig, BinanceFuturesClient, ExchangePort};
use futuresbot::execution::{EngineState, OrderSequencer, TradingLoop};
use futuresbot::*;
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const API_KEY: &str = "test-key";

fn client_for(server: &ServerGuard) -> BinanceFuturesClient {
    BinanceFuturesClient::new(BinanceConfig {
        base_url: server.url(),
        api_key: API_KEY.to_string(),
        api_secret: "test-secret".to_string(),
        ..Default::default()
    })
    .unwrap()
}

/// Query carried by every signed request
fn signed_query(extra: Vec<Matcher>) -> Matcher {
    let mut matchers = vec![
        Matcher::UrlEncoded("recvWindow".into(), "6000".into()),
        Matcher::Regex("timestamp=[0-9]+".into()),
        Matcher::Regex("signature=[0-9a-f]{64}".into()),
    ];
    matchers.extend(extra);
    Matcher::AllOf(matchers)
}

#[tokio::test]
async fn test_balance_is_signed_and_picks_quote_asset() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v2/balance")
        .match_header("X-MBX-APIKEY", API_KEY)
        .match_query(signed_query(vec![]))
        .with_status(200)
        .with_body(
            r#"[
                {"accountAlias":"a","asset":"BNB","balance":"0.5"},
                {"accountAlias":"a","asset":"USDT","balance":"123.45"}
            ]"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let balance = client.get_balance("USDT").await.unwrap();

    assert_eq!(balance, 123.45);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_api_error_keeps_venue_code_and_message() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.get_balance("USDT").await.unwrap_err();

    match &err {
        ExchangeError::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(*status, 401);
            assert_eq!(*code, -2015);
            assert!(message.contains("Invalid API-key"));
        }
        other => panic!("expected api error, got {:?}", other),
    }
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_rate_limit_status_maps_to_rate_limited() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/ticker/price")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(r#"{"code":-1003,"msg":"Too many requests."}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.get_price("BTCUSDT").await.unwrap_err();

    assert!(matches!(err, ExchangeError::RateLimited(_)));
}

#[tokio::test]
async fn test_list_symbols_keeps_quote_asset_pairs_in_venue_order() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/ticker/price")
        .with_status(200)
        .with_body(
            r#"[
                {"symbol":"BTCUSDT","price":"60000.10","time":1700000000000},
                {"symbol":"ETHBTC","price":"0.05","time":1700000000000},
                {"symbol":"ETHUSDT","price":"3000.00","time":1700000000000},
                {"symbol":"BTCUSDC","price":"60001.00","time":1700000000000}
            ]"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let symbols = client.list_symbols().await.unwrap();

    assert_eq!(symbols, vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
}

#[tokio::test]
async fn test_candles_request_interval_and_limit() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fapi/v1/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("interval".into(), "15m".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"[
                [1700000000000,"100.0","101.0","99.0","100.5","1500.0",1700000899999,"0",10,"0","0","0"],
                [1700000900000,"100.5","102.0","100.0","101.5","1700.0",1700001799999,"0",12,"0","0","0"]
            ]"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let candles = client
        .get_candles("BTCUSDT", CandleInterval::FifteenMinutes, 2)
        .await
        .unwrap();

    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].close, 100.5);
    assert_eq!(candles[1].volume, 1700.0);
    assert!(candles[0].open_time < candles[1].open_time);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_positions_skip_flat_entries() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
                {"symbol":"BTCUSDT","positionAmt":"0.010","entryPrice":"60000"},
                {"symbol":"ETHUSDT","positionAmt":"0.000","entryPrice":"0"},
                {"symbol":"XRPUSDT","positionAmt":"-50","entryPrice":"0.6"}
            ]"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let positions = client.get_open_positions().await.unwrap();

    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].symbol, "BTCUSDT");
    assert_eq!(positions[1].signed_quantity, -50.0);
}

#[tokio::test]
async fn test_open_orders_are_parsed() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/openOrders")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
                {"symbol":"BTCUSDT","orderId":11,"type":"STOP_MARKET","side":"SELL","price":"0","stopPrice":"59000.0"},
                {"symbol":"BTCUSDT","orderId":12,"type":"LIMIT","side":"BUY","price":"60000.0","stopPrice":"0"}
            ]"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let orders = client.get_open_orders().await.unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order_type, OrderType::StopMarket);
    assert_eq!(orders[0].side, Side::Short);
    assert_eq!(orders[0].price, None);
    assert_eq!(orders[0].stop_price, Some(59000.0));
    assert_eq!(orders[1].order_id, "12");
    assert_eq!(orders[1].price, Some(60000.0));
}

#[tokio::test]
async fn test_limit_and_stop_orders_send_venue_params() {
    let mut server = Server::new_async().await;

    let entry = server
        .mock("POST", "/fapi/v1/order")
        .match_query(signed_query(vec![
            Matcher::UrlEncoded("type".into(), "LIMIT".into()),
            Matcher::UrlEncoded("side".into(), "BUY".into()),
            Matcher::UrlEncoded("price".into(), "100.0".into()),
            Matcher::UrlEncoded("quantity".into(), "0.100".into()),
            Matcher::UrlEncoded("timeInForce".into(), "GTC".into()),
            Matcher::UrlEncoded("newClientOrderId".into(), "abc-en".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":1001,"symbol":"BTCUSDT","status":"NEW"}"#)
        .create_async()
        .await;

    let stop = server
        .mock("POST", "/fapi/v1/order")
        .match_query(signed_query(vec![
            Matcher::UrlEncoded("type".into(), "STOP_MARKET".into()),
            Matcher::UrlEncoded("side".into(), "SELL".into()),
            Matcher::UrlEncoded("stopPrice".into(), "99.1".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":1002,"symbol":"BTCUSDT","status":"NEW"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let base = OrderRequest {
        symbol: "BTCUSDT".to_string(),
        side: Side::Long,
        order_type: OrderType::Limit,
        quantity: 0.1,
        price: 100.0,
        qty_precision: 3,
        price_precision: 1,
        client_order_id: Some("abc-en".to_string()),
    };

    let entry_id = client.place_order(&base).await.unwrap();
    let stop_id = client
        .place_order(&OrderRequest {
            side: Side::Short,
            order_type: OrderType::StopMarket,
            price: 99.1,
            client_order_id: None,
            ..base.clone()
        })
        .await
        .unwrap();

    assert_eq!(entry_id, "1001");
    assert_eq!(stop_id, "1002");
    entry.assert_async().await;
    stop.assert_async().await;
}

#[tokio::test]
async fn test_precision_is_fetched_once_and_cached() {
    let mut server = Server::new_async().await;
    let info = server
        .mock("GET", "/fapi/v1/exchangeInfo")
        .with_status(200)
        .with_body(
            r#"{"symbols":[
                {"symbol":"BTCUSDT","pricePrecision":1,"quantityPrecision":3},
                {"symbol":"XRPUSDT","pricePrecision":4,"quantityPrecision":1}
            ]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);

    assert_eq!(client.get_price_precision("BTCUSDT").await.unwrap(), 1);
    assert_eq!(client.get_qty_precision("BTCUSDT").await.unwrap(), 3);
    assert_eq!(client.get_price_precision("XRPUSDT").await.unwrap(), 4);
    assert_eq!(client.get_qty_precision("XRPUSDT").await.unwrap(), 1);

    info.assert_async().await;
}

#[tokio::test]
async fn test_unknown_symbol_precision() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v1/exchangeInfo")
        .with_status(200)
        .with_body(r#"{"symbols":[{"symbol":"BTCUSDT","pricePrecision":1,"quantityPrecision":3}]}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client.get_price_precision("NOPEUSDT").await.unwrap_err();

    assert!(matches!(err, ExchangeError::UnknownSymbol(s) if s == "NOPEUSDT"));
}

// ============================================================================
// Full cycle against the mock venue
// ============================================================================

fn trading_loop(server: &ServerGuard) -> TradingLoop {
    let config = BotConfig::default();
    TradingLoop::new(
        Arc::new(client_for(server)),
        config.loop_settings(),
        config.strategy.build(),
        config.position_cap(),
        OrderSequencer::new(config.bracket_params()),
    )
}

#[tokio::test]
async fn test_cycle_skipped_when_key_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
        .create_async()
        .await;
    let positions = server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let mut engine = trading_loop(&server);
    let mut state = EngineState::default();
    let report = engine.run_cycle(&mut state, &CancellationToken::new()).await;

    assert!(report.skipped);
    assert_eq!(report.balance, None);
    positions.assert_async().await;
}

#[tokio::test]
async fn test_cycle_cancels_orders_left_without_position() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/fapi/v2/balance")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"asset":"USDT","balance":"250.0"}]"#)
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v1/ticker/price")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v2/positionRisk")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"[{"symbol":"BTCUSDT","positionAmt":"0.010"}]"#)
        .create_async()
        .await;
    server
        .mock("GET", "/fapi/v1/openOrders")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"[
                {"symbol":"BTCUSDT","orderId":1,"type":"STOP_MARKET","side":"SELL","price":"0","stopPrice":"59000"},
                {"symbol":"SOLUSDT","orderId":2,"type":"STOP_MARKET","side":"SELL","price":"0","stopPrice":"140"},
                {"symbol":"SOLUSDT","orderId":3,"type":"TAKE_PROFIT_MARKET","side":"SELL","price":"0","stopPrice":"160"}
            ]"#,
        )
        .create_async()
        .await;
    let cancel_sol = server
        .mock("DELETE", "/fapi/v1/allOpenOrders")
        .match_query(signed_query(vec![Matcher::UrlEncoded(
            "symbol".into(),
            "SOLUSDT".into(),
        )]))
        .with_status(200)
        .with_body(r#"{"code":200,"msg":"The operation of cancel all open order is done."}"#)
        .expect(1)
        .create_async()
        .await;

    let mut engine = trading_loop(&server);
    let mut state = EngineState::default();
    let report = engine.run_cycle(&mut state, &CancellationToken::new()).await;

    assert!(!report.skipped);
    assert_eq!(report.balance, Some(250.0));
    assert_eq!(report.cancelled, vec!["SOLUSDT".to_string()]);
    cancel_sol.assert_async().await;
}
