use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invoicekit_core::{
    normalize_currency_code, Aggregate, AggregateId, AggregateRoot, DomainError, TaxRate,
    TenantId,
};
use invoicekit_events::Event;

use crate::numbering::format_invoice_number;

pub const DEFAULT_CURRENCY: &str = "PKR";
pub const DEFAULT_NUMBERING_PREFIX: &str = "INV-";
pub const DEFAULT_LOCALE: &str = "en-PK";
pub const DEFAULT_TIMEZONE: &str = "Asia/Karachi";
/// Largest value the invoice counter may hold; sequences are stored as BIGINT.
pub const MAX_NEXT_NUMBER: u64 = i64::MAX as u64;

/// Settings stream identifier. Always derived from the owning tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsId(pub AggregateId);

impl SettingsId {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self(AggregateId::from(tenant_id))
    }
}

/// Company details printed on invoices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub logo_url: Option<String>,
}

/// Defaults applied to new invoices, plus the numbering counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDefaults {
    pub default_tax_rate: TaxRate,
    pub default_currency: String,
    pub numbering_prefix: String,
    /// Sequence the next reserved invoice number will carry.
    pub next_number: u64,
    pub locale: String,
    pub timezone: String,
}

impl Default for BillingDefaults {
    fn default() -> Self {
        Self {
            default_tax_rate: TaxRate::ZERO,
            default_currency: DEFAULT_CURRENCY.to_string(),
            numbering_prefix: DEFAULT_NUMBERING_PREFIX.to_string(),
            next_number: 1,
            locale: DEFAULT_LOCALE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

/// Aggregate root: CompanySettings.
///
/// A tenant that never configured its settings still gets invoice numbers: the
/// counter starts from [`BillingDefaults::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanySettings {
    id: SettingsId,
    tenant_id: Option<TenantId>,
    profile: CompanyProfile,
    defaults: BillingDefaults,
    configured: bool,
    version: u64,
}

impl CompanySettings {
    pub fn empty(id: SettingsId) -> Self {
        Self {
            id,
            tenant_id: None,
            profile: CompanyProfile::default(),
            defaults: BillingDefaults::default(),
            configured: false,
            version: 0,
        }
    }

    pub fn profile(&self) -> &CompanyProfile {
        &self.profile
    }

    pub fn defaults(&self) -> &BillingDefaults {
        &self.defaults
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Display form of the number the next reservation will hand out.
    pub fn preview_next_number(&self) -> String {
        format_invoice_number(&self.defaults.numbering_prefix, self.defaults.next_number)
    }
}

impl AggregateRoot for CompanySettings {
    type Id = SettingsId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ConfigureSettings (create or replace profile and defaults).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureSettings {
    pub tenant_id: TenantId,
    pub profile: CompanyProfile,
    pub defaults: BillingDefaults,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveInvoiceNumber (hand out `next_number` and advance it by one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInvoiceNumber {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsCommand {
    ConfigureSettings(ConfigureSettings),
    ReserveInvoiceNumber(ReserveInvoiceNumber),
}

/// Event: SettingsConfigured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsConfigured {
    pub tenant_id: TenantId,
    pub profile: CompanyProfile,
    pub defaults: BillingDefaults,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceNumberReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNumberReserved {
    pub tenant_id: TenantId,
    pub sequence: u64,
    /// Display number (`INV-007`).
    pub number: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsEvent {
    SettingsConfigured(SettingsConfigured),
    InvoiceNumberReserved(InvoiceNumberReserved),
}

impl SettingsEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            SettingsEvent::SettingsConfigured(e) => e.tenant_id,
            SettingsEvent::InvoiceNumberReserved(e) => e.tenant_id,
        }
    }
}

impl Event for SettingsEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SettingsEvent::SettingsConfigured(_) => "settings.company.configured",
            SettingsEvent::InvoiceNumberReserved(_) => "settings.company.invoice_number_reserved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SettingsEvent::SettingsConfigured(e) => e.occurred_at,
            SettingsEvent::InvoiceNumberReserved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CompanySettings {
    type Command = SettingsCommand;
    type Event = SettingsEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SettingsEvent::SettingsConfigured(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.profile = e.profile.clone();
                self.defaults = e.defaults.clone();
                self.configured = true;
            }
            SettingsEvent::InvoiceNumberReserved(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.defaults.next_number = e.sequence.saturating_add(1);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SettingsCommand::ConfigureSettings(cmd) => self.handle_configure(cmd),
            SettingsCommand::ReserveInvoiceNumber(cmd) => self.handle_reserve(cmd),
        }
    }
}

impl CompanySettings {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.id != SettingsId::for_tenant(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        match self.tenant_id {
            Some(owner) if owner != tenant_id => Err(DomainError::invariant("tenant mismatch")),
            _ => Ok(()),
        }
    }

    fn handle_configure(
        &self,
        cmd: &ConfigureSettings,
    ) -> Result<Vec<SettingsEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        let profile = normalize_profile(&cmd.profile);
        if profile.name.is_empty() {
            return Err(DomainError::validation("company name cannot be empty"));
        }

        let mut defaults = cmd.defaults.clone();
        defaults.default_tax_rate.ensure_within_bounds()?;
        defaults.default_currency = normalize_currency_code(&defaults.default_currency)?;
        defaults.numbering_prefix = defaults.numbering_prefix.trim().to_string();
        defaults.locale = non_empty_or(&defaults.locale, DEFAULT_LOCALE);
        defaults.timezone = non_empty_or(&defaults.timezone, DEFAULT_TIMEZONE);

        if defaults.next_number < 1 {
            return Err(DomainError::validation("next_number must be at least 1"));
        }
        if defaults.next_number > MAX_NEXT_NUMBER {
            return Err(DomainError::validation(format!(
                "next_number cannot exceed {MAX_NEXT_NUMBER}"
            )));
        }
        // Moving the counter backwards would hand out numbers that are already taken.
        if defaults.next_number < self.defaults.next_number {
            return Err(DomainError::validation(format!(
                "next_number cannot go below {}",
                self.defaults.next_number
            )));
        }

        Ok(vec![SettingsEvent::SettingsConfigured(SettingsConfigured {
            tenant_id: cmd.tenant_id,
            profile,
            defaults,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(
        &self,
        cmd: &ReserveInvoiceNumber,
    ) -> Result<Vec<SettingsEvent>, DomainError> {
        self.ensure_tenant(cmd.tenant_id)?;

        let sequence = self.defaults.next_number;
        if sequence.checked_add(1).is_none_or(|next| next > MAX_NEXT_NUMBER) {
            return Err(DomainError::conflict("invoice number counter is exhausted"));
        }
        Ok(vec![SettingsEvent::InvoiceNumberReserved(InvoiceNumberReserved {
            tenant_id: cmd.tenant_id,
            sequence,
            number: format_invoice_number(&self.defaults.numbering_prefix, sequence),
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn normalize_profile(profile: &CompanyProfile) -> CompanyProfile {
    fn opt(v: &Option<String>) -> Option<String> {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    CompanyProfile {
        name: profile.name.trim().to_string(),
        address: opt(&profile.address),
        phone: opt(&profile.phone),
        email: opt(&profile.email),
        tax_id: opt(&profile.tax_id),
        logo_url: opt(&profile.logo_url),
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
