//! Error classification and user-facing messages
//!
//! The presentation layer needs to tell failures apart ("please type a
//! question" vs "the assistant is temporarily unavailable") without showing
//! raw internal error text. This module maps every [`AssistantError`] to a
//! coarse [`ErrorKind`] and a short localized apology.

use tracing::{error, warn};

use crate::AssistantError;
use crate::generation::Language;

/// Coarse classification of an [`AssistantError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    IndexNotFound,
    IndexVersionMismatch,
    ProviderUnavailable,
    GenerationFailed,
    Internal,
}

impl AssistantError {
    /// Classify this error
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::IndexNotFound { .. } => ErrorKind::IndexNotFound,
            Self::IndexVersionMismatch { .. } => ErrorKind::IndexVersionMismatch,
            Self::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::Config(_) | Self::Index(_) | Self::Io(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same request may succeed if the user simply tries again
    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ProviderUnavailable | ErrorKind::GenerationFailed
        )
    }

    /// Short apology shown to the user instead of the raw error text
    #[inline]
    pub const fn user_message(&self, language: Language) -> &'static str {
        match (self.kind(), language) {
            (ErrorKind::InvalidInput, Language::French) => "Veuillez saisir une question.",
            (ErrorKind::InvalidInput, Language::English) => "Please type a question.",
            (ErrorKind::InvalidInput, Language::Arabic) => "يرجى كتابة سؤال.",
            (ErrorKind::IndexNotFound | ErrorKind::IndexVersionMismatch, Language::French) => {
                "L'assistant n'a pas pu être initialisé. Veuillez contacter l'administrateur."
            }
            (ErrorKind::IndexNotFound | ErrorKind::IndexVersionMismatch, Language::English) => {
                "The assistant could not be initialized. Please contact the administrator."
            }
            (ErrorKind::IndexNotFound | ErrorKind::IndexVersionMismatch, Language::Arabic) => {
                "تعذّر تشغيل المساعد. يرجى التواصل مع المسؤول."
            }
            (ErrorKind::ProviderUnavailable, Language::French) => {
                "L'assistant est temporairement indisponible. Veuillez réessayer."
            }
            (ErrorKind::ProviderUnavailable, Language::English) => {
                "The assistant is temporarily unavailable. Please try again."
            }
            (ErrorKind::ProviderUnavailable, Language::Arabic) => {
                "المساعد غير متاح مؤقتًا. يرجى المحاولة مرة أخرى."
            }
            (ErrorKind::GenerationFailed | ErrorKind::Internal, Language::French) => {
                "Désolé, une erreur est survenue. Veuillez réessayer."
            }
            (ErrorKind::GenerationFailed | ErrorKind::Internal, Language::English) => {
                "Sorry, something went wrong. Please try again."
            }
            (ErrorKind::GenerationFailed | ErrorKind::Internal, Language::Arabic) => {
                "عذرًا، حدث خطأ. يرجى المحاولة مرة أخرى."
            }
        }
    }

    /// Log the error with a level matching its kind
    #[inline]
    pub fn log(&self) {
        match self.kind() {
            ErrorKind::InvalidInput => warn!("Rejected input: {}", self),
            ErrorKind::ProviderUnavailable | ErrorKind::GenerationFailed => {
                error!("Backend error: {}", self);
            }
            ErrorKind::IndexNotFound | ErrorKind::IndexVersionMismatch => {
                error!("Initialization error: {}", self);
            }
            ErrorKind::Internal => error!("Internal error: {}", self),
        }
    }
}
