//! Outbound charge request value object.

use std::collections::HashMap;

use crate::domain::foundation::{Money, ValidationError};

use super::PaymentMethod;

/// A validated charge request, built through [`PaymentRequest::builder`].
///
/// Construction enforces the cross-field invariants (card token iff
/// credit_card, installment limits), so any value of this type is safe to
/// hand to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Money,
    pub description: String,
    pub payer_email: String,
    pub payer_tax_id: Option<String>,
    pub method: PaymentMethod,
    pub card_token: Option<String>,
    pub installments: u8,
    pub external_reference: String,
    pub metadata: HashMap<String, String>,
}

impl PaymentRequest {
    /// Starts building a charge request for the given amount and method.
    pub fn builder(amount: Money, method: PaymentMethod) -> PaymentRequestBuilder {
        PaymentRequestBuilder {
            amount,
            method,
            description: None,
            payer_email: None,
            payer_tax_id: None,
            card_token: None,
            installments: 1,
            external_reference: None,
            metadata: HashMap::new(),
        }
    }
}

/// Fluent builder for [`PaymentRequest`]; `build` runs all invariants.
#[derive(Debug, Clone)]
pub struct PaymentRequestBuilder {
    amount: Money,
    method: PaymentMethod,
    description: Option<String>,
    payer_email: Option<String>,
    payer_tax_id: Option<String>,
    card_token: Option<String>,
    installments: u8,
    external_reference: Option<String>,
    metadata: HashMap<String, String>,
}

impl PaymentRequestBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn payer_email(mut self, email: impl Into<String>) -> Self {
        self.payer_email = Some(email.into());
        self
    }

    /// CPF (11 digits) or CNPJ (14 digits); punctuation is accepted.
    pub fn payer_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.payer_tax_id = Some(tax_id.into());
        self
    }

    /// Opaque token obtained client-side; raw card data never enters here.
    pub fn card_token(mut self, token: impl Into<String>) -> Self {
        self.card_token = Some(token.into());
        self
    }

    pub fn installments(mut self, installments: u8) -> Self {
        self.installments = installments;
        self
    }

    pub fn external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validates and produces the request.
    pub fn build(self) -> Result<PaymentRequest, ValidationError> {
        if !self.method.is_chargeable() {
            return Err(ValidationError::invalid_format(
                "payment_method",
                "free subscriptions never reach the gateway",
            ));
        }

        if !self.amount.is_positive() {
            return Err(ValidationError::invalid_format(
                "amount",
                format!("charge amount must be positive, got {}", self.amount),
            ));
        }

        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ValidationError::empty_field("description"))?;

        let payer_email = self
            .payer_email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ValidationError::empty_field("payer_email"))?;
        if !payer_email.contains('@') {
            return Err(ValidationError::invalid_format(
                "payer_email",
                "missing @ symbol",
            ));
        }

        let external_reference = self
            .external_reference
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| ValidationError::empty_field("external_reference"))?;

        if let Some(tax_id) = &self.payer_tax_id {
            let digits = tax_id.chars().filter(char::is_ascii_digit).count();
            if digits != 11 && digits != 14 {
                return Err(ValidationError::invalid_format(
                    "payer_tax_id",
                    "expected a CPF (11 digits) or CNPJ (14 digits)",
                ));
            }
        }

        match (&self.method, &self.card_token) {
            (method, None) if method.requires_card_token() => {
                return Err(ValidationError::invalid_format(
                    "card_token",
                    "required when payment method is credit_card",
                ));
            }
            (method, Some(_)) if !method.requires_card_token() => {
                return Err(ValidationError::invalid_format(
                    "card_token",
                    format!("not allowed for payment method {}", method),
                ));
            }
            _ => {}
        }

        if self.installments < 1 || self.installments > 12 {
            return Err(ValidationError::out_of_range(
                "installments",
                1,
                12,
                i32::from(self.installments),
            ));
        }
        if self.installments > 1 && self.method != PaymentMethod::CreditCard {
            return Err(ValidationError::invalid_format(
                "installments",
                "only credit_card supports more than one installment",
            ));
        }

        Ok(PaymentRequest {
            amount: self.amount,
            description,
            payer_email,
            payer_tax_id: self.payer_tax_id,
            method: self.method,
            card_token: self.card_token,
            installments: self.installments,
            external_reference,
            metadata: self.metadata,
        })
    }
}
