//! A hardware-backed cosigner variant.
//!
//! Present only to pin down the [`Cosigner`] capability an HSM integration
//! must provide; every operation is a stub.

use crate::cosigner::Cosigner;
use crate::messages::{
    EphemeralSecretPart, GetEphemeralSecretPartRequest, SetEphemeralSecretPartRequest,
    SignRequest, SignResponse,
};
use crate::vote::HrstKey;
use crate::Error;

/// A cosigner that forwards its operations to external hardware.
pub struct HsmCosigner {
    id: u8,
}

impl HsmCosigner {
    /// Declare an HSM-backed cosigner with the given set id.
    pub fn new(id: u8) -> HsmCosigner {
        HsmCosigner { id }
    }
}

impl Cosigner for HsmCosigner {
    fn id(&self) -> u8 {
        self.id
    }

    fn deal_shares(&self, _hrst: &HrstKey) -> Result<(), Error> {
        unimplemented!("HSM-backed cosigning is not implemented");
    }

    fn get_ephemeral_secret_part(
        &self,
        _req: &GetEphemeralSecretPartRequest,
    ) -> Result<EphemeralSecretPart, Error> {
        unimplemented!("HSM-backed cosigning is not implemented");
    }

    fn set_ephemeral_secret_part(
        &self,
        _req: &SetEphemeralSecretPartRequest,
    ) -> Result<(), Error> {
        unimplemented!("HSM-backed cosigning is not implemented");
    }

    fn sign(&self, _req: &SignRequest) -> Result<SignResponse, Error> {
        unimplemented!("HSM-backed cosigning is not implemented");
    }
}
