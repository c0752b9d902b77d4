use std::{sync::Arc, time::Duration};

use ::metrics::prometheus::{self, Encoder, Registry, TextEncoder};
use actix_web::{
    App, HttpResponse, HttpServer, Responder, error::InternalError, get, http::StatusCode, post,
    web,
};
use beacon::BeaconClientManager;
use eth::ExecutionClientManager;
use etherscan::EtherscanGasOracle;
use serde::{Deserialize, Serialize};
use services::{
    HealthReport, HealthReporter, QueryManager, TransactionManager,
    beacon::port::Api as _,
    execution::port::{Address, Api as _, BlockId, Bytes, U256},
    gas_oracle::{GasFeeSuggestion, port::Api as _},
    query_manager::Call,
    request::RequestScope,
    transaction_manager::TransactionInfo,
};
use tracing::warn;

use crate::{
    config::Config,
    errors::{Error, Result},
};

alloy::sol! {
    interface IMulticall3Balances {
        function getEthBalance(address addr) external view returns (uint256 balance);
    }
}

/// Everything the request handlers reach upstream through.
pub struct Upstreams {
    pub execution: ExecutionClientManager,
    pub beacon: BeaconClientManager,
    pub query_manager: QueryManager<ExecutionClientManager>,
    pub transaction_manager: TransactionManager<ExecutionClientManager>,
    pub gas_oracle: Option<EtherscanGasOracle>,
    pub request_timeout: Duration,
}

impl Upstreams {
    fn scope(&self) -> RequestScope {
        RequestScope::new().with_timeout(self.request_timeout)
    }

    fn health_reporter(&self) -> HealthReporter {
        HealthReporter::new(
            Box::new(self.execution.clone()),
            Box::new(self.beacon.clone()),
        )
    }
}

pub async fn launch_api_server(
    config: &Config,
    metrics_registry: Registry,
    upstreams: Upstreams,
) -> Result<()> {
    let metrics_registry = Arc::new(metrics_registry);
    let health_reporter = Arc::new(upstreams.health_reporter());
    let upstreams = Arc::new(upstreams);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(Arc::clone(&metrics_registry)))
            .app_data(web::Data::new(Arc::clone(&health_reporter)))
            .app_data(web::Data::new(Arc::clone(&upstreams)))
            .service(health)
            .service(status)
            .service(metrics)
            .service(balances)
            .service(simulate)
            .service(gas)
    })
    .bind((config.app.host, config.app.port))
    .map_err(|e| Error::Other(e.to_string()))?
    .run()
    .await
    .map_err(|e| Error::Other(e.to_string()))
}

#[get("/health")]
async fn health(data: web::Data<Arc<HealthReporter>>) -> impl Responder {
    let report = data.generate_report();

    let mut response = if report.is_healthy() {
        HttpResponse::Ok()
    } else {
        HttpResponse::InternalServerError()
    };

    response.json(report)
}

#[derive(Debug, Serialize)]
struct StatusReport {
    upstreams: HealthReport,
    execution_block_number: Option<u64>,
    beacon_head_slot: Option<u64>,
    beacon_syncing: Option<bool>,
}

#[get("/status")]
async fn status(
    upstreams: web::Data<Arc<Upstreams>>,
    health_reporter: web::Data<Arc<HealthReporter>>,
) -> impl Responder {
    let (block_number, beacon_sync) = upstreams
        .scope()
        .run(async {
            tokio::join!(
                upstreams.execution.block_number(),
                upstreams.beacon.node_syncing()
            )
        })
        .await;

    let execution_block_number = block_number
        .inspect_err(|e| warn!("Could not read execution block number: {e}"))
        .ok();
    let beacon_sync = beacon_sync
        .inspect_err(|e| warn!("Could not read beacon sync status: {e}"))
        .ok();

    web::Json(StatusReport {
        upstreams: health_reporter.generate_report(),
        execution_block_number,
        beacon_head_slot: beacon_sync.as_ref().map(|sync| sync.head_slot),
        beacon_syncing: beacon_sync.map(|sync| sync.is_syncing),
    })
}

#[derive(Debug, Deserialize)]
struct BalancesQuery {
    /// Comma separated addresses.
    addresses: String,
}

#[derive(Debug, Serialize)]
struct Balance {
    address: Address,
    balance: U256,
}

#[get("/balances")]
async fn balances(
    upstreams: web::Data<Arc<Upstreams>>,
    query: web::Query<BalancesQuery>,
) -> Result<web::Json<Vec<Balance>>> {
    let addresses = parse_addresses(&query.addresses)?;

    let multicall = upstreams.query_manager.multicall_address();
    let calls: Vec<Call> = addresses
        .iter()
        .map(|&addr| Call::new(multicall, &IMulticall3Balances::getEthBalanceCall { addr }))
        .collect();

    let results = upstreams
        .scope()
        .run(upstreams.query_manager.query_all(&calls, BlockId::latest()))
        .await?;

    let balances = addresses
        .into_iter()
        .zip(results)
        .map(|(address, result)| {
            let balance = result.decode::<IMulticall3Balances::getEthBalanceCall>()?;
            Ok(Balance { address, balance })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(web::Json(balances))
}

fn parse_addresses(addresses: &str) -> Result<Vec<Address>> {
    addresses
        .split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(|address| {
            address
                .parse()
                .map_err(|e| Error::BadRequest(format!("'{address}' is not an address: {e}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SimulationRequest {
    from: Address,
    to: Address,
    #[serde(default)]
    data: Bytes,
    #[serde(default)]
    value: U256,
}

#[post("/simulate")]
async fn simulate(
    upstreams: web::Data<Arc<Upstreams>>,
    request: web::Json<SimulationRequest>,
) -> Result<web::Json<TransactionInfo>> {
    let SimulationRequest {
        from,
        to,
        data,
        value,
    } = request.into_inner();

    let info = upstreams
        .scope()
        .run(
            upstreams
                .transaction_manager
                .create_transaction_info(from, to, data, value),
        )
        .await?;

    Ok(web::Json(info))
}

#[get("/gas")]
async fn gas(upstreams: web::Data<Arc<Upstreams>>) -> Result<HttpResponse> {
    let Some(oracle) = &upstreams.gas_oracle else {
        return Ok(HttpResponse::NotFound().body("no gas oracle configured"));
    };

    let suggestion: GasFeeSuggestion = upstreams.scope().run(oracle.gas_prices()).await?;

    Ok(HttpResponse::Ok().json(suggestion))
}

#[get("/metrics")]
async fn metrics(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buf: Vec<u8> = vec![];
    let mut encode = |metrics: &_| {
        encoder
            .encode(metrics, &mut buf)
            .map_err(map_to_internal_err)
    };

    encode(&registry.gather())?;
    encode(&prometheus::gather())?;

    let text = String::from_utf8(buf).map_err(map_to_internal_err)?;

    std::result::Result::<_, InternalError<_>>::Ok(text)
}

fn map_to_internal_err(error: impl std::error::Error) -> InternalError<String> {
    InternalError::new(error.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use ::metrics::RegistersMetrics;
    use actix_web::test as actix_test;
    use pretty_assertions::assert_eq;
    use services::{query_manager::MULTICALL3_ADDRESS, request::Timeouts};
    use tokio::net::TcpListener;
    use url::Url;

    use super::*;

    async fn closed_endpoint() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        format!("http://127.0.0.1:{port}").parse().unwrap()
    }

    async fn unreachable_upstreams() -> Upstreams {
        let timeouts = Timeouts {
            fast: Duration::from_secs(2),
            slow: Duration::from_secs(2),
        };
        let reconnect_delay = Duration::from_secs(60);
        let execution = ExecutionClientManager::connect(
            closed_endpoint().await,
            Some(closed_endpoint().await),
            timeouts,
            reconnect_delay,
        )
        .unwrap();
        let beacon =
            BeaconClientManager::connect(closed_endpoint().await, None, timeouts, reconnect_delay)
                .unwrap();

        Upstreams {
            query_manager: QueryManager::new(execution.clone(), MULTICALL3_ADDRESS, 1),
            transaction_manager: TransactionManager::new(execution.clone(), 0, 1.5).unwrap(),
            gas_oracle: None,
            execution,
            beacon,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[actix_web::test]
    async fn health_reflects_readiness_of_both_upstreams() {
        // given
        let upstreams = unreachable_upstreams().await;
        let reporter = Arc::new(upstreams.health_reporter());
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::clone(&reporter)))
                .service(health),
        )
        .await;

        // when
        let request = actix_test::TestRequest::get().uri("/health").to_request();
        let response = actix_test::call_service(&app, request).await;

        // then
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = actix_test::read_body_json(response).await;
        assert_eq!(
            body["execution"],
            serde_json::json!({
                "client_type": "Execution Client",
                "primary_ready": true,
                "fallback_enabled": true,
                "fallback_ready": true,
            })
        );
        assert_eq!(body["beacon"]["fallback_enabled"], false);
    }

    #[actix_web::test]
    async fn status_reports_what_it_could_not_read_as_null() {
        // given
        let upstreams = Arc::new(unreachable_upstreams().await);
        let reporter = Arc::new(upstreams.health_reporter());
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::clone(&upstreams)))
                .app_data(web::Data::new(Arc::clone(&reporter)))
                .service(status),
        )
        .await;

        // when
        let request = actix_test::TestRequest::get().uri("/status").to_request();
        let response = actix_test::call_service(&app, request).await;

        // then
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = actix_test::read_body_json(response).await;
        assert_eq!(body["execution_block_number"], serde_json::Value::Null);
        assert_eq!(body["beacon_head_slot"], serde_json::Value::Null);
        assert_eq!(body["upstreams"]["execution"]["primary_ready"], false);
        assert_eq!(body["upstreams"]["execution"]["fallback_ready"], false);
    }

    #[actix_web::test]
    async fn balances_reject_malformed_addresses() {
        // given
        let upstreams = Arc::new(unreachable_upstreams().await);
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::clone(&upstreams)))
                .service(balances),
        )
        .await;

        // when
        let response = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/balances?addresses=0x0000000000000000000000000000000000000001,nope")
                .to_request(),
        )
        .await;

        // then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn simulation_with_no_reachable_node_is_unavailable() {
        // given
        let upstreams = Arc::new(unreachable_upstreams().await);
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::clone(&upstreams)))
                .service(simulate),
        )
        .await;

        // when
        let response = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/simulate")
                .set_json(serde_json::json!({
                    "from": "0x0000000000000000000000000000000000000001",
                    "to": "0x0000000000000000000000000000000000000002",
                }))
                .to_request(),
        )
        .await;

        // then
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn gas_without_an_oracle_is_not_found() {
        // given
        let upstreams = Arc::new(unreachable_upstreams().await);
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::clone(&upstreams)))
                .service(gas),
        )
        .await;

        // when
        let request = actix_test::TestRequest::get().uri("/gas").to_request();
        let response = actix_test::call_service(&app, request).await;

        // then
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn gas_with_an_unreachable_oracle_is_unavailable() {
        // given
        let mut upstreams = unreachable_upstreams().await;
        upstreams.gas_oracle = Some(
            EtherscanGasOracle::new(closed_endpoint().await, Duration::from_secs(2)).unwrap(),
        );
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::new(upstreams)))
                .service(gas),
        )
        .await;

        // when
        let request = actix_test::TestRequest::get().uri("/gas").to_request();
        let response = actix_test::call_service(&app, request).await;

        // then
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn metrics_expose_upstream_readiness() {
        // given
        let upstreams = unreachable_upstreams().await;
        let registry = Registry::new();
        upstreams.execution.register_metrics(&registry).unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::new(registry)))
                .service(metrics),
        )
        .await;

        // when
        let request = actix_test::TestRequest::get().uri("/metrics").to_request();
        let response = actix_test::call_service(&app, request).await;

        // then
        assert_eq!(response.status(), StatusCode::OK);
        let body = String::from_utf8(actix_test::read_body(response).await.to_vec()).unwrap();
        assert!(body.contains("upstream_client_ready"), "{body}");
    }

    #[test]
    fn addresses_are_split_on_commas() {
        let addresses = parse_addresses(
            "0x0000000000000000000000000000000000000001, 0x0000000000000000000000000000000000000002,",
        )
        .unwrap();

        assert_eq!(
            addresses,
            vec![Address::with_last_byte(1), Address::with_last_byte(2)]
        );
    }
}
