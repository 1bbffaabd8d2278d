/// Generates one borrowing client per resource from a table of
/// `Name => accessor, "Segment", RecordType { operations };` rows, plus the
/// matching accessor on [`ErpClient`](super::ErpClient). Paths live under
/// the versioned `/api/v1/` prefix.
///
/// Every generated method builds a path (and options), calls exactly one
/// `ApiClient` verb, and returns its result as is. Ids must form exactly
/// one path segment; anything else fails as `InvalidRequest` unsent.
macro_rules! resource_clients {
    (@op $record:ty, retrieve) => {
        #[doc = "Fetch one record. `include` names nested collections to expand."]
        pub async fn retrieve(&self, id: &str, include: Option<&str>) -> ApiResult<$record> {
            self.api
                .get(&self.record_path(id)?, RequestOptions::new().param("include", include))
                .await
        }
    };
    (@op $record:ty, update) => {
        #[doc = "Apply a partial update; only the fields present in `changes` are modified."]
        pub async fn update<B>(&self, id: &str, changes: &B) -> ApiResult<$record>
        where
            B: Serialize + ?Sized,
        {
            self.api
                .patch(&self.record_path(id)?, RequestOptions::new(), changes)
                .await
        }
    };
    (@op $record:ty, delete) => {
        #[doc = "Delete one record."]
        pub async fn delete(&self, id: &str) -> ApiResult<()> {
            self.api.delete(&self.record_path(id)?, RequestOptions::new()).await
        }
    };
    (@op $record:ty, disable) => {
        #[doc = "Disable one record. The server keeps it but hides it from normal use."]
        pub async fn disable(&self, id: &str) -> ApiResult<()> {
            self.api.delete(&self.record_path(id)?, RequestOptions::new()).await
        }
    };
    (@op $record:ty, create) => {
        #[doc = "Create records in bulk and return them as stored by the server."]
        pub async fn create<B>(&self, records: &[B]) -> ApiResult<Vec<$record>>
        where
            B: Serialize,
        {
            self.api.post(Self::PATH, RequestOptions::new(), records).await
        }
    };
    (@op $record:ty, query) => {
        #[doc = "Run a query and return one page of results."]
        pub async fn query(&self, query: &Query) -> ApiResult<Page<$record>> {
            self.api
                .get(&format!("{}/query", Self::PATH), query.to_options())
                .await
        }
    };

    ($(
        $(#[$meta:meta])*
        $name:ident => $accessor:ident, $segment:literal, $record:ty { $($op:ident),+ $(,)? };
    )+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            pub struct $name<'a> {
                api: &'a ApiClient,
            }

            impl<'a> $name<'a> {
                pub const PATH: &'static str = concat!("/api/v1/", $segment);

                pub fn new(api: &'a ApiClient) -> Self {
                    Self { api }
                }

                fn record_path(&self, id: &str) -> ApiResult<String> {
                    record_path(Self::PATH, id)
                }

                $( resource_clients!(@op $record, $op); )+
            }
        )+

        impl ErpClient {
            $(
                pub fn $accessor(&self) -> $name<'_> {
                    $name::new(&self.api)
                }
            )+
        }
    };
}
