use std::sync::Arc;

use domain::{DomainError, Identity, User, UserId, Username};
use uuid::Uuid;

use crate::{
    clock::Clock,
    credentials::{AuthError, PasswordHasher},
    error::ApplicationError,
    repository::UserRepository,
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub username: String,
    pub password: String,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

/// 账号注册、登录与身份查询
pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let username = Username::parse(request.username)?;

        if self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::UserAlreadyExists.into());
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let user = User::register(
            UserId::from(Uuid::new_v4()),
            username,
            password_hash,
            self.deps.clock.now(),
        );

        let stored = self.deps.user_repository.create(user).await?;
        tracing::info!(user_id = %stored.id, username = %stored.username, "user registered");
        Ok(stored)
    }

    pub async fn authenticate(
        &self,
        request: AuthenticateUserRequest,
    ) -> Result<User, ApplicationError> {
        let username =
            Username::parse(request.username).map_err(|_| AuthError::InvalidCredentials)?;
        let user = self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            return Err(AuthError::InvalidCredentials.into());
        }

        Ok(user)
    }

    pub async fn find_identity(&self, id: UserId) -> Result<Identity, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_id(id)
            .await?
            .ok_or(DomainError::UserNotFound)?;
        Ok(user.identity())
    }

    /// 全部已知身份，按用户名排序
    pub async fn list_people(&self) -> Result<Vec<Identity>, ApplicationError> {
        let users = self.deps.user_repository.list_all().await?;
        Ok(users.iter().map(User::identity).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::PasswordHasherError;
    use crate::repository::MockUserRepository;
    use async_trait::async_trait;
    use domain::{PasswordHash, RepositoryError, Timestamp};

    struct PlainHasher;

    #[async_trait]
    impl PasswordHasher for PlainHasher {
        async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
            PasswordHash::new(format!("plain:{plaintext}"))
                .map_err(|e| PasswordHasherError::hash_error(e.to_string()))
        }

        async fn verify(
            &self,
            plaintext: &str,
            hashed: &PasswordHash,
        ) -> Result<bool, PasswordHasherError> {
            Ok(hashed.as_str() == format!("plain:{plaintext}"))
        }
    }

    struct FixedClock(Timestamp);

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            self.0
        }
    }

    fn service(repo: MockUserRepository) -> UserService {
        UserService::new(UserServiceDependencies {
            user_repository: Arc::new(repo),
            password_hasher: Arc::new(PlainHasher),
            clock: Arc::new(FixedClock(chrono::Utc::now())),
        })
    }

    fn stored_user(name: &str, password: &str) -> User {
        User::register(
            UserId(Uuid::new_v4()),
            Username::parse(name).unwrap(),
            PasswordHash::new(format!("plain:{password}")).unwrap(),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn register_hashes_password_and_stores_user() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_username().returning(|_| Ok(None));
        repo.expect_create().times(1).returning(|user| Ok(user));

        let user = service(repo)
            .register(RegisterUserRequest {
                username: " alice ".into(),
                password: "secret".into(),
            })
            .await
            .unwrap();

        assert_eq!(user.username.as_str(), "alice");
        assert_eq!(user.password.as_str(), "plain:secret");
    }

    #[tokio::test]
    async fn register_rejects_taken_username() {
        let existing = stored_user("alice", "x");
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_username()
            .returning(move |_| Ok(Some(existing.clone())));
        repo.expect_create().never();

        let err = service(repo)
            .register(RegisterUserRequest {
                username: "alice".into(),
                password: "secret".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn authenticate_checks_password() {
        let existing = stored_user("alice", "secret");
        let expected_id = existing.id;
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_username()
            .returning(move |_| Ok(Some(existing.clone())));
        let svc = service(repo);

        let user = svc
            .authenticate(AuthenticateUserRequest {
                username: "alice".into(),
                password: "secret".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.id, expected_id);

        let err = svc
            .authenticate(AuthenticateUserRequest {
                username: "alice".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Authentication(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn authenticate_unknown_user_is_invalid_credentials() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_username().returning(|_| Ok(None));

        let err = service(repo)
            .authenticate(AuthenticateUserRequest {
                username: "ghost".into(),
                password: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Authentication(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn find_identity_and_people() {
        let alice = stored_user("alice", "x");
        let bob = stored_user("bob", "y");
        let alice_id = alice.id;
        let people = vec![alice.clone(), bob];

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .returning(move |id| Ok((id == alice.id).then(|| alice.clone())));
        repo.expect_list_all().returning(move || Ok(people.clone()));
        let svc = service(repo);

        let identity = svc.find_identity(alice_id).await.unwrap();
        assert_eq!(identity.display_name, "alice");

        let err = svc.find_identity(UserId(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Domain(DomainError::UserNotFound)));

        let names: Vec<_> = svc
            .list_people()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.display_name)
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn repository_failure_propagates() {
        let mut repo = MockUserRepository::new();
        repo.expect_list_all()
            .returning(|| Err(RepositoryError::storage("down")));

        let err = service(repo).list_people().await.unwrap_err();
        assert!(matches!(err, ApplicationError::Repository(_)));
    }
}
