use crate::fetcher::ReqwestFetcher;
use apiscout_core::{Address, Endpoint, Error, HttpFetcher, Result, WebPage};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A stateless handle bound to one `Endpoint`. Created lazily by
/// `Www::get`; its only operation materialises the endpoint's OpenAPI
/// document.
#[derive(Clone)]
pub struct Machine {
    endpoint: Endpoint,
    fetcher: Arc<dyn HttpFetcher>,
}

impl Machine {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn request(&self, cancel: CancellationToken) -> Result<WebPage> {
        self.fetcher.fetch(&self.endpoint, cancel).await
    }
}

/// An immutable table mapping dense addresses `0..N` onto `Endpoint`s.
/// Built once from either a local-directory corpus or a persisted
/// endpoints file; lives for the process.
pub struct Www {
    endpoints: Vec<Endpoint>,
    fetcher: Arc<dyn HttpFetcher>,
}

impl Www {
    /// Deserialises the §6.1 endpoints JSON array directly; array index is
    /// the address.
    pub fn from_endpoints_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::NotFound(e.to_string()))?;
        let endpoints: Vec<Endpoint> =
            serde_json::from_slice(&bytes).map_err(|e| Error::Protocol(e.to_string()))?;
        Self::with_endpoints(endpoints)
    }

    /// One subdirectory per locally-launched API server. Subdirectories are
    /// enumerated in sorted-by-name order and each must contain an
    /// `endpoint.json` holding a single §6.1-shaped `Endpoint` record — the
    /// local-server launcher that produces those files is out of scope; this
    /// constructor only consumes what it writes.
    pub fn from_local_dir(path: &Path) -> Result<Self> {
        let mut dir_names: Vec<_> = std::fs::read_dir(path)
            .map_err(|e| Error::NotFound(e.to_string()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.path())
            .collect();
        dir_names.sort();

        let mut endpoints = Vec::with_capacity(dir_names.len());
        for dir in dir_names {
            let descriptor = dir.join("endpoint.json");
            let bytes = std::fs::read(&descriptor).map_err(|e| Error::NotFound(e.to_string()))?;
            let endpoint: Endpoint =
                serde_json::from_slice(&bytes).map_err(|e| Error::Protocol(e.to_string()))?;
            endpoints.push(endpoint);
        }
        Self::with_endpoints(endpoints)
    }

    pub(crate) fn with_endpoints(endpoints: Vec<Endpoint>) -> Result<Self> {
        Ok(Self {
            endpoints,
            fetcher: Arc::new(ReqwestFetcher::new()?),
        })
    }

    /// Swaps in a non-default transport. Used by tests and by callers who
    /// want a shared `reqwest::Client`.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn all_addresses(&self) -> Vec<Address> {
        (0..self.endpoints.len() as u64).map(Address).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, address: Address) -> Result<Machine> {
        let endpoint = self
            .endpoints
            .get(address.0 as usize)
            .ok_or_else(|| Error::NotFound(format!("address {address} out of range")))?;
        Ok(Machine {
            endpoint: endpoint.clone(),
            fetcher: self.fetcher.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiscout_core::Protocol;
    use async_trait::async_trait;

    struct StubFetcher;

    #[async_trait]
    impl HttpFetcher for StubFetcher {
        async fn fetch(&self, endpoint: &Endpoint, _cancel: CancellationToken) -> Result<WebPage> {
            Ok(WebPage {
                title: format!("page at {}", endpoint.path),
                endpoint: endpoint.clone(),
                content: serde_json::json!({}),
            })
        }
    }

    fn endpoint(path: &str) -> Endpoint {
        Endpoint {
            protocol: Protocol::Http,
            ip_address: "127.0.0.1".to_string(),
            port: 8080,
            path: path.to_string(),
        }
    }

    #[test]
    fn all_addresses_is_dense_and_zero_based() {
        let www = Www::with_endpoints(vec![endpoint("/a"), endpoint("/b"), endpoint("/c")]).unwrap();
        assert_eq!(
            www.all_addresses(),
            vec![Address(0), Address(1), Address(2)]
        );
    }

    #[test]
    fn get_out_of_range_is_not_found() {
        let www = Www::with_endpoints(vec![endpoint("/a")]).unwrap();
        let err = www.get(Address(1)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn machine_request_delegates_to_fetcher() {
        let www = Www::with_endpoints(vec![endpoint("/a")])
            .unwrap()
            .with_fetcher(Arc::new(StubFetcher));
        let machine = www.get(Address(0)).unwrap();
        let wp = machine.request(CancellationToken::new()).await.unwrap();
        assert_eq!(wp.title, "page at /a");
    }

    #[test]
    fn from_endpoints_file_preserves_array_order_as_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endpoints.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&vec![endpoint("/first"), endpoint("/second")]).unwrap(),
        )
        .unwrap();
        let www = Www::from_endpoints_file(&path).unwrap();
        assert_eq!(www.get(Address(0)).unwrap().endpoint().path, "/first");
        assert_eq!(www.get(Address(1)).unwrap().endpoint().path, "/second");
    }

    #[test]
    fn from_local_dir_sorts_subdirectories_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for (name, path) in [("b-server", "/b"), ("a-server", "/a")] {
            let sub = dir.path().join(name);
            std::fs::create_dir(&sub).unwrap();
            std::fs::write(
                sub.join("endpoint.json"),
                serde_json::to_vec(&endpoint(path)).unwrap(),
            )
            .unwrap();
        }
        let www = Www::from_local_dir(dir.path()).unwrap();
        assert_eq!(www.get(Address(0)).unwrap().endpoint().path, "/a");
        assert_eq!(www.get(Address(1)).unwrap().endpoint().path, "/b");
    }
}
