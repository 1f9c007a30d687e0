#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Service not registered: {service}")]
    Missing { service: &'static str },
    #[error("Invalid service configuration: {0}")]
    Invalid(String),
}

impl ServiceError {
    pub fn missing<T: ?Sized>() -> Self {
        ServiceError::Missing {
            service: std::any::type_name::<T>(),
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
