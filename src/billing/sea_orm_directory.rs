//! SeaORM view over the CRM tables.
//!
//! The CRM owns these tables and their migrations; the entities below
//! declare only the columns billing reads.

use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use secrecy::SecretString;

use super::directory::CrmDirectory;
use super::sea_orm_store::entity::billing_profile;
use super::types::{
    ACTIVE_CLIENT_STATUS, AdmCloudCredentials, AdmCloudSettings, BankTransferInfo, Company,
    EntityCounts, Recipient, Workspace,
};
use crate::error::{AppError, Result};

/// Project status counted as active.
pub const ACTIVE_PROJECT_STATUS: &str = "active";

pub mod entity {
    pub mod workspace {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "workspaces")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub name: String,
            pub legal_name: Option<String>,
            pub address: Option<String>,
            pub phone: Option<String>,
            pub logo_url: Option<String>,
            pub tax_id: Option<String>,
            pub billing_enabled: bool,
            pub billing_sender_email: Option<String>,
            pub billing_email_subject: Option<String>,
            pub billing_email_body: Option<String>,
            /// Comma separated or JSON array
            pub billing_cc: Option<String>,
            pub admcloud_enabled: bool,
            pub admcloud_app_id: Option<String>,
            pub admcloud_company: Option<String>,
            pub admcloud_username: Option<String>,
            pub admcloud_password: Option<String>,
            pub admcloud_payment_term_id: Option<String>,
            pub admcloud_sales_stage_id: Option<String>,
            /// JSON object, see `BankTransferInfo`
            pub bank_transfer: Option<String>,
            pub proforma_notes: Option<String>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod company {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "companies")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub workspace_id: String,
            pub name: String,
            pub legal_name: Option<String>,
            pub rnc: Option<String>,
            pub fiscal_address: Option<String>,
            pub status: String,
            pub admcloud_relationship_id: Option<String>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod contact {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "contacts")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub company_id: String,
            pub name: String,
            pub email: Option<String>,
            pub receives_invoices: bool,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod project {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "projects")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub company_id: String,
            pub status: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod company_user {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "company_users")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub company_id: String,
            pub is_active: bool,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{company, company_user, contact, project, workspace};

fn db_err(e: sea_orm::DbErr) -> AppError {
    AppError::Database(e.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a CC list stored either as a JSON array or comma/semicolon separated.
pub fn parse_address_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Vec::new();
    };

    let entries: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).unwrap_or_default()
    } else {
        raw.split([',', ';']).map(str::to_string).collect()
    };

    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

fn model_to_company(model: company::Model) -> Company {
    Company {
        id: model.id,
        workspace_id: model.workspace_id,
        name: model.name,
        legal_name: model.legal_name,
        tax_id: non_blank(model.rnc),
        fiscal_address: model.fiscal_address,
        status: model.status,
        admcloud_relationship_id: non_blank(model.admcloud_relationship_id),
    }
}

fn model_to_workspace(model: workspace::Model) -> Workspace {
    let credentials = match (
        non_blank(model.admcloud_app_id),
        non_blank(model.admcloud_company),
        non_blank(model.admcloud_username),
        non_blank(model.admcloud_password),
    ) {
        (Some(app_id), Some(company), Some(username), Some(password)) => Some(AdmCloudCredentials {
            app_id,
            company,
            username,
            password: SecretString::from(password),
        }),
        _ => None,
    };

    let bank_transfer = model.bank_transfer.as_deref().and_then(|raw| {
        serde_json::from_str::<BankTransferInfo>(raw)
            .map_err(|e| {
                tracing::warn!(
                    workspace_id = %model.id,
                    error = %e,
                    "Ignoring malformed bank transfer settings"
                );
            })
            .ok()
    });

    Workspace {
        billing_cc: parse_address_list(model.billing_cc.as_deref()),
        admcloud: AdmCloudSettings {
            enabled: model.admcloud_enabled,
            credentials,
            default_payment_term_id: non_blank(model.admcloud_payment_term_id),
            default_sales_stage_id: non_blank(model.admcloud_sales_stage_id),
        },
        bank_transfer,
        id: model.id,
        name: model.name,
        legal_name: model.legal_name,
        address: model.address,
        phone: model.phone,
        logo_url: model.logo_url,
        tax_id: model.tax_id,
        billing_enabled: model.billing_enabled,
        billing_sender_email: model.billing_sender_email,
        billing_email_subject: non_blank(model.billing_email_subject),
        billing_email_body: non_blank(model.billing_email_body),
        proforma_notes: non_blank(model.proforma_notes),
    }
}

/// SeaORM implementation of [`CrmDirectory`].
#[derive(Clone, Debug)]
pub struct SeaOrmCrmDirectory {
    db: DatabaseConnection,
}

impl SeaOrmCrmDirectory {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CrmDirectory for SeaOrmCrmDirectory {
    async fn billing_workspaces(&self) -> Result<Vec<Workspace>> {
        let models = workspace::Entity::find()
            .filter(workspace::Column::BillingEnabled.eq(true))
            .filter(workspace::Column::BillingSenderEmail.is_not_null())
            .order_by_asc(workspace::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok(models
            .into_iter()
            .map(model_to_workspace)
            .filter(|ws| ws.sender().is_some())
            .collect())
    }

    async fn due_companies(&self, workspace_id: &str, day: u32) -> Result<Vec<Company>> {
        let due_ids: Vec<String> = billing_profile::Entity::find()
            .filter(billing_profile::Column::BillingDay.eq(day as i32))
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(|profile| profile.company_id)
            .collect();

        if due_ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = company::Entity::find()
            .filter(company::Column::WorkspaceId.eq(workspace_id))
            .filter(company::Column::Status.eq(ACTIVE_CLIENT_STATUS))
            .filter(company::Column::Id.is_in(due_ids))
            .order_by_asc(company::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok(models.into_iter().map(model_to_company).collect())
    }

    async fn company(&self, company_id: &str) -> Result<Option<Company>> {
        let model = company::Entity::find_by_id(company_id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(model.map(model_to_company))
    }

    async fn workspace(&self, workspace_id: &str) -> Result<Option<Workspace>> {
        let model = workspace::Entity::find_by_id(workspace_id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(model.map(model_to_workspace))
    }

    async fn invoice_recipients(&self, company_id: &str) -> Result<Vec<Recipient>> {
        let models = contact::Entity::find()
            .filter(contact::Column::CompanyId.eq(company_id))
            .filter(contact::Column::ReceivesInvoices.eq(true))
            .order_by_asc(contact::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        Ok(models
            .into_iter()
            .filter_map(|c| {
                let email = non_blank(c.email)?;
                Some(Recipient {
                    name: c.name,
                    email: email.trim().to_string(),
                })
            })
            .collect())
    }

    async fn entity_counts(&self, company_id: &str) -> Result<EntityCounts> {
        let projects = project::Entity::find()
            .filter(project::Column::CompanyId.eq(company_id))
            .filter(project::Column::Status.eq(ACTIVE_PROJECT_STATUS))
            .count(&self.db)
            .await
            .map_err(db_err)?;

        let users = company_user::Entity::find()
            .filter(company_user::Column::CompanyId.eq(company_id))
            .filter(company_user::Column::IsActive.eq(true))
            .count(&self.db)
            .await
            .map_err(db_err)?;

        Ok(EntityCounts {
            active_projects: u32::try_from(projects).unwrap_or(u32::MAX),
            active_users: u32::try_from(users).unwrap_or(u32::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_list() {
        assert_eq!(
            parse_address_list(Some("a@x.test, b@x.test;c@x.test")),
            vec!["a@x.test", "b@x.test", "c@x.test"]
        );
        assert_eq!(
            parse_address_list(Some(r#"["a@x.test", " "]"#)),
            vec!["a@x.test"]
        );
        assert!(parse_address_list(Some("  ")).is_empty());
        assert!(parse_address_list(None).is_empty());
    }

    fn workspace_model() -> workspace::Model {
        workspace::Model {
            id: "w1".into(),
            name: "Acme".into(),
            legal_name: Some("Acme SRL".into()),
            address: None,
            phone: None,
            logo_url: None,
            tax_id: None,
            billing_enabled: true,
            billing_sender_email: Some("billing@acme.test".into()),
            billing_email_subject: Some("  ".into()),
            billing_email_body: None,
            billing_cc: Some("ops@acme.test".into()),
            admcloud_enabled: true,
            admcloud_app_id: Some("app".into()),
            admcloud_company: Some("co".into()),
            admcloud_username: Some("user".into()),
            admcloud_password: None,
            admcloud_payment_term_id: None,
            admcloud_sales_stage_id: None,
            bank_transfer: Some("{not json".into()),
            proforma_notes: None,
        }
    }

    #[test]
    fn test_workspace_mapping() {
        let ws = model_to_workspace(workspace_model());
        // Missing password leaves credentials unset
        assert!(ws.admcloud.enabled);
        assert!(ws.admcloud.credentials.is_none());
        assert!(ws.bank_transfer.is_none());
        assert!(ws.billing_email_subject.is_none());
        assert_eq!(ws.billing_cc, vec!["ops@acme.test"]);
    }
}
