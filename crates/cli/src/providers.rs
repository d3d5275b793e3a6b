use molsim_core::InstanceProvider;
use molsim_core::error::MolsimError;
use molsim_ec2::{Credentials, Ec2};

use crate::config::Ec2Config;

pub fn create_provider_handle(config: &Ec2Config) -> Result<Box<dyn InstanceProvider>, MolsimError> {
    let credentials = Credentials {
        access_key_id: config.access_key_id.clone(),
        secret_access_key: config.secret_access_key.clone(),
        session_token: config.session_token.clone(),
    };
    Ok(Box::new(Ec2::new(credentials, config.region.clone(), config.endpoint.clone())?))
}
