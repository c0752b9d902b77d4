use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use services::{
    Result,
    beacon::{
        port::Api,
        types::{
            Attestation, BeaconBlock, BlockHeaderResponse, BlsToExecutionChangeRequest,
            ChainSpec, Committee, DepositContract, Envelope, FinalityCheckpoints, Fork, Genesis,
            ProposerDuty, SignedBeaconBlock, SyncDuty, SyncStatus, Validator,
            VoluntaryExitRequest,
        },
    },
    request::{Timeouts, guarded},
};
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Single consensus endpoint speaking the Beacon REST API.
#[derive(Debug, Clone)]
pub struct BeaconHttpClient {
    client: Client,
    base_url: String,
    host: String,
    timeouts: Timeouts,
}

impl BeaconHttpClient {
    pub fn new(url: Url, timeouts: Timeouts) -> crate::error::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.fast)
            .use_rustls_tls()
            .build()?;

        let host = url.host_str().unwrap_or_default().to_owned();
        let base_url = url.as_str().trim_end_matches('/').to_owned();

        Ok(Self {
            client,
            base_url,
            host,
            timeouts,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends `request` and decodes the body. With `allow_missing` a 404 yields `None`.
    async fn fetch<T: DeserializeOwned>(
        &self,
        timeout: Duration,
        path: &str,
        request: RequestBuilder,
        allow_missing: bool,
    ) -> Result<Option<T>> {
        debug!("Calling {path} on {}", self.host);
        guarded(timeout, path, async {
            let response = request.send().await.map_err(Error::from)?;
            if allow_missing && response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            let response = ensure_success(response).await?;
            let body = response.json::<T>().await.map_err(Error::from)?;
            Ok::<_, services::Error>(Some(body))
        })
        .await
    }

    async fn get<T: DeserializeOwned>(&self, timeout: Duration, path: &str) -> Result<T> {
        let request = self.client.get(self.url(path));

        self.required(path, self.fetch(timeout, path, request, false).await?)
    }

    async fn get_with_query<T, Q>(&self, timeout: Duration, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.client.get(self.url(path)).query(query);

        self.required(path, self.fetch(timeout, path, request, false).await?)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).json(body);

        self.required(
            path,
            self.fetch(self.timeouts.fast, path, request, false).await?,
        )
    }

    /// Pool submissions answer with an empty 200 body.
    async fn submit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        debug!("Submitting to {path} on {}", self.host);
        let request = self.client.post(self.url(path)).json(body);

        guarded(self.timeouts.fast, path, async {
            let response = request.send().await.map_err(Error::from)?;
            ensure_success(response).await?;
            Ok::<_, services::Error>(())
        })
        .await
    }

    /// Enveloped GET where a 404 means the resource is unknown.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        timeout: Duration,
        path: &str,
    ) -> Result<Option<T>> {
        let request = self.client.get(self.url(path));
        let envelope: Option<Envelope<T>> = self.fetch(timeout, path, request, true).await?;

        Ok(envelope.map(|envelope| envelope.data))
    }

    fn required<T>(&self, path: &str, body: Option<T>) -> Result<T> {
        body.ok_or_else(|| {
            services::Error::Other(format!("{path} on {} returned no body", self.host))
        })
    }
}

async fn ensure_success(response: Response) -> crate::error::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("<failed to read response body: {e}>"),
    };
    Err(Error::Http { status, body })
}

impl Api for BeaconHttpClient {
    async fn node_syncing(&self) -> Result<SyncStatus> {
        let envelope: Envelope<SyncStatus> =
            self.get(self.timeouts.fast, "/eth/v1/node/syncing").await?;
        Ok(envelope.data)
    }

    async fn config_spec(&self) -> Result<ChainSpec> {
        let envelope: Envelope<ChainSpec> =
            self.get(self.timeouts.fast, "/eth/v1/config/spec").await?;
        Ok(envelope.data)
    }

    async fn config_deposit_contract(&self) -> Result<DepositContract> {
        let envelope: Envelope<DepositContract> = self
            .get(self.timeouts.fast, "/eth/v1/config/deposit_contract")
            .await?;
        Ok(envelope.data)
    }

    async fn beacon_genesis(&self) -> Result<Genesis> {
        let envelope: Envelope<Genesis> =
            self.get(self.timeouts.fast, "/eth/v1/beacon/genesis").await?;
        Ok(envelope.data)
    }

    async fn beacon_finality_checkpoints(&self, state_id: &str) -> Result<FinalityCheckpoints> {
        let path = format!("/eth/v1/beacon/states/{state_id}/finality_checkpoints");
        let envelope: Envelope<FinalityCheckpoints> = self.get(self.timeouts.fast, &path).await?;
        Ok(envelope.data)
    }

    async fn beacon_fork(&self, state_id: &str) -> Result<Fork> {
        let path = format!("/eth/v1/beacon/states/{state_id}/fork");
        let envelope: Envelope<Fork> = self.get(self.timeouts.fast, &path).await?;
        Ok(envelope.data)
    }

    async fn beacon_header(&self, block_id: &str) -> Result<Option<BlockHeaderResponse>> {
        let path = format!("/eth/v1/beacon/headers/{block_id}");
        let request = self.client.get(self.url(&path));

        self.fetch(self.timeouts.fast, &path, request, true).await
    }

    async fn beacon_attestations(&self, block_id: &str) -> Result<Option<Vec<Attestation>>> {
        let path = format!("/eth/v1/beacon/blocks/{block_id}/attestations");
        self.get_optional(self.timeouts.fast, &path).await
    }

    async fn beacon_block(&self, block_id: &str) -> Result<Option<BeaconBlock>> {
        let path = format!("/eth/v2/beacon/blocks/{block_id}");
        let block: Option<SignedBeaconBlock> =
            self.get_optional(self.timeouts.fast, &path).await?;
        Ok(block.map(|block| block.message))
    }

    async fn beacon_validators(&self, state_id: &str, ids: &[String]) -> Result<Vec<Validator>> {
        let path = format!("/eth/v1/beacon/states/{state_id}/validators");
        let envelope: Envelope<Vec<Validator>> = if ids.is_empty() {
            self.get(self.timeouts.slow, &path).await?
        } else {
            self.get_with_query(self.timeouts.slow, &path, &[("id", ids.join(","))])
                .await?
        };
        Ok(envelope.data)
    }

    async fn beacon_committees(
        &self,
        state_id: &str,
        epoch: Option<u64>,
    ) -> Result<Vec<Committee>> {
        let path = format!("/eth/v1/beacon/states/{state_id}/committees");
        let envelope: Envelope<Vec<Committee>> = match epoch {
            Some(epoch) => {
                self.get_with_query(self.timeouts.slow, &path, &[("epoch", epoch)])
                    .await?
            }
            None => self.get(self.timeouts.slow, &path).await?,
        };
        Ok(envelope.data)
    }

    async fn beacon_voluntary_exits_post(&self, request: &VoluntaryExitRequest) -> Result<()> {
        self.submit("/eth/v1/beacon/pool/voluntary_exits", request)
            .await
    }

    async fn beacon_bls_to_execution_changes_post(
        &self,
        request: &BlsToExecutionChangeRequest,
    ) -> Result<()> {
        self.submit("/eth/v1/beacon/pool/bls_to_execution_changes", &[request])
            .await
    }

    async fn validator_duties_proposer(&self, epoch: u64) -> Result<Vec<ProposerDuty>> {
        let path = format!("/eth/v1/validator/duties/proposer/{epoch}");
        let envelope: Envelope<Vec<ProposerDuty>> = self.get(self.timeouts.fast, &path).await?;
        Ok(envelope.data)
    }

    async fn validator_duties_sync_post(
        &self,
        indices: &[String],
        epoch: u64,
    ) -> Result<Vec<SyncDuty>> {
        let path = format!("/eth/v1/validator/duties/sync/{epoch}");
        let envelope: Envelope<Vec<SyncDuty>> = self.post(&path, indices).await?;
        Ok(envelope.data)
    }
}
