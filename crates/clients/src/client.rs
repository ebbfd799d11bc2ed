use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicekit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use invoicekit_events::Event;

/// Client identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Client status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Archived,
}

/// Everything a company records about a client besides its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetails {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl ClientDetails {
    /// Trim free-text fields and turn blank optionals into `None`.
    fn normalized(&self) -> Self {
        fn opt(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        Self {
            name: self.name.trim().to_string(),
            email: opt(&self.email),
            phone: opt(&self.phone),
            address: opt(&self.address),
            notes: opt(&self.notes),
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.is_empty() {
            return Err(DomainError::validation("client name cannot be empty"));
        }
        if let Some(email) = &self.email {
            let well_formed = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !well_formed {
                return Err(DomainError::validation(format!(
                    "'{email}' is not a valid email address"
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    id: ClientId,
    tenant_id: Option<TenantId>,
    details: ClientDetails,
    status: ClientStatus,
    version: u64,
    created: bool,
}

impl Client {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ClientId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: ClientDetails::default(),
            status: ClientStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn details(&self) -> &ClientDetails {
        &self.details
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    /// Archived clients keep their history but cannot be billed again.
    pub fn can_be_invoiced(&self) -> bool {
        self.created && self.status == ClientStatus::Active
    }
}

impl AggregateRoot for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClient {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateClient (full replacement of the details).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClient {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ArchiveClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveClient {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    RegisterClient(RegisterClient),
    UpdateClient(UpdateClient),
    ArchiveClient(ArchiveClient),
}

/// Event: ClientRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistered {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdated {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientArchived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientArchived {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    ClientRegistered(ClientRegistered),
    ClientUpdated(ClientUpdated),
    ClientArchived(ClientArchived),
}

impl ClientEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ClientEvent::ClientRegistered(e) => e.tenant_id,
            ClientEvent::ClientUpdated(e) => e.tenant_id,
            ClientEvent::ClientArchived(e) => e.tenant_id,
        }
    }

    pub fn client_id(&self) -> ClientId {
        match self {
            ClientEvent::ClientRegistered(e) => e.client_id,
            ClientEvent::ClientUpdated(e) => e.client_id,
            ClientEvent::ClientArchived(e) => e.client_id,
        }
    }
}

impl Event for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientRegistered(_) => "clients.client.registered",
            ClientEvent::ClientUpdated(_) => "clients.client.updated",
            ClientEvent::ClientArchived(_) => "clients.client.archived",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientEvent::ClientRegistered(e) => e.occurred_at,
            ClientEvent::ClientUpdated(e) => e.occurred_at,
            ClientEvent::ClientArchived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Client {
    type Command = ClientCommand;
    type Event = ClientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientEvent::ClientRegistered(e) => {
                self.id = e.client_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.status = ClientStatus::Active;
                self.created = true;
            }
            ClientEvent::ClientUpdated(e) => {
                self.details = e.details.clone();
            }
            ClientEvent::ClientArchived(_) => {
                self.status = ClientStatus::Archived;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientCommand::RegisterClient(cmd) => self.handle_register(cmd),
            ClientCommand::UpdateClient(cmd) => self.handle_update(cmd),
            ClientCommand::ArchiveClient(cmd) => self.handle_archive(cmd),
        }
    }
}

impl Client {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_client_id(&self, client_id: ClientId) -> Result<(), DomainError> {
        if self.id != client_id {
            return Err(DomainError::invariant("client_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterClient) -> Result<Vec<ClientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client already exists"));
        }

        let details = cmd.details.normalized();
        details.validate()?;

        Ok(vec![ClientEvent::ClientRegistered(ClientRegistered {
            tenant_id: cmd.tenant_id,
            client_id: cmd.client_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateClient) -> Result<Vec<ClientEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_client_id(cmd.client_id)?;

        if self.status == ClientStatus::Archived {
            return Err(DomainError::invariant("archived clients cannot be updated"));
        }

        let details = cmd.details.normalized();
        details.validate()?;

        Ok(vec![ClientEvent::ClientUpdated(ClientUpdated {
            tenant_id: cmd.tenant_id,
            client_id: cmd.client_id,
            details,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_archive(&self, cmd: &ArchiveClient) -> Result<Vec<ClientEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_client_id(cmd.client_id)?;

        if self.status == ClientStatus::Archived {
            return Err(DomainError::conflict("client is already archived"));
        }

        Ok(vec![ClientEvent::ClientArchived(ClientArchived {
            tenant_id: cmd.tenant_id,
            client_id: cmd.client_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
