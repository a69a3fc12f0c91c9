//! Authorization hooks
//!
//! The registry consults an [`Authorizer`] before starting a publication,
//! opening a recording and attaching a subscriber. The default allows all.

use std::path::Path;

use crate::media::Properties;
use crate::publication::Publication;

pub trait Authorizer: Send + Sync {
    /// Deny a publish by returning the reason
    fn on_publish(&self, _publication: &Publication, _params: &Properties) -> Result<(), String> {
        Ok(())
    }

    /// Deny recording `publication` to `path`
    fn on_record(&self, _publication: &Publication, _path: &Path) -> Result<(), String> {
        Ok(())
    }

    fn on_subscribe(&self, _publication: &Publication, _params: &Properties) -> Result<(), String> {
        Ok(())
    }
}

/// Allows everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {}
