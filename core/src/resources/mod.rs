//! Per-resource clients over the shared [`ApiClient`].
//!
//! # Design
//! Resource clients carry no state and no logic: each one borrows the
//! `ApiClient` owned by [`ErpClient`] and turns "resource + verb" into a
//! path and a single call. The table below is the only place a resource is
//! declared. Delete-shaped endpoints are generated as `delete` or `disable`
//! following the platform's naming; both issue `DELETE` on the record path
//! and leave the resulting state to the server.

#[macro_use]
mod macros;

use std::sync::Arc;

use serde::Serialize;

use crate::client::{record_path, ApiClient, RequestOptions};
use crate::config::{ClientConfig, ConfigError, Credential};
use crate::error::ApiResult;
use crate::models::{Company, CustomFieldDefinition, Email, Lead, Record};
use crate::pagination::{Page, Query};
use crate::transport::Transport;

/// Entry point: owns the API client and hands out resource clients.
#[derive(Debug, Clone)]
pub struct ErpClient {
    api: Arc<ApiClient>,
}

impl ErpClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_api(Arc::new(ApiClient::new(config)?)))
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self::from_api(Arc::new(ApiClient::with_transport(config, transport)))
    }

    pub fn from_api(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn set_credential(&self, credential: Credential) {
        self.api.set_credential(credential);
    }

    pub fn clear_credential(&self) {
        self.api.clear_credential();
    }
}

resource_clients! {
    Accounts => accounts, "Accounts", Record { retrieve, update, delete, create, query };
    /// Append-only activity log.
    Activities => activities, "Activities", Record { retrieve, create, query };
    Bills => bills, "Bills", Record { retrieve, update, delete, create, query };
    Campaigns => campaigns, "Campaigns", Record { retrieve, update, delete, create, query };
    Companies => companies, "Companies", Company { retrieve, update, disable, create, query };
    Contacts => contacts, "Contacts", Record { retrieve, update, delete, create, query };
    CustomFieldDefinitions => custom_field_definitions, "CustomFieldDefinitions", CustomFieldDefinition {
        retrieve, update, delete, create, query
    };
    Customers => customers, "Customers", Record { retrieve, update, delete, create, query };
    Emails => emails, "Emails", Email { retrieve, update, delete, create, query };
    Employees => employees, "Employees", Record { retrieve, update, disable, create, query };
    Estimates => estimates, "Estimates", Record { retrieve, update, delete, create, query };
    Events => events, "Events", Record { retrieve, update, delete, create, query };
    Files => files, "Files", Record { retrieve, delete, query };
    Invoices => invoices, "Invoices", Record { retrieve, update, delete, create, query };
    Items => items, "Items", Record { retrieve, update, disable, create, query };
    Leads => leads, "Leads", Lead { retrieve, update, delete, create, query };
    Notes => notes, "Notes", Record { retrieve, update, delete, create, query };
    Opportunities => opportunities, "Opportunities", Record { retrieve, update, delete, create, query };
    Payments => payments, "Payments", Record { retrieve, update, delete, create, query };
    PaymentTerms => payment_terms, "PaymentTerms", Record { retrieve, update, disable, create, query };
    PurchaseOrders => purchase_orders, "PurchaseOrders", Record { retrieve, update, delete, create, query };
    SalesOrders => sales_orders, "SalesOrders", Record { retrieve, update, delete, create, query };
    SalesReceipts => sales_receipts, "SalesReceipts", Record { retrieve, update, delete, create, query };
    Tasks => tasks, "Tasks", Record { retrieve, update, delete, create, query };
    TaxRates => tax_rates, "TaxRates", Record { retrieve, update, disable, create, query };
    /// Users are provisioned by the platform; they can be edited and
    /// disabled but not created through the API.
    Users => users, "Users", Record { retrieve, update, disable, query };
    Vendors => vendors, "Vendors", Record { retrieve, update, disable, create, query };
    Webhooks => webhooks, "Webhooks", Record { retrieve, update, delete, create, query };
}
