mod history_service;
mod user_service;

pub use history_service::HistoryService;
pub use user_service::{
    AuthenticateUserRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};
