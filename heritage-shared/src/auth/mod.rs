/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength rules
/// - [`jwt`]: access/refresh token issuance and validation
/// - [`invitation_code`]: human-friendly family invitation codes
/// - [`middleware`]: bearer-token authentication for Axum requests
/// - [`authorization`]: family membership and role checks
///
/// # Example
///
/// ```
/// use heritage_shared::auth::password::{hash_password, verify_password};
/// use heritage_shared::auth::jwt::{create_token, validate_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Gr4ndma's-recipe")?;
/// assert!(verify_password("Gr4ndma's-recipe", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), "ada@example.com", TokenType::Access);
/// let token = create_token(&claims, "a-secret-that-is-long-enough-for-hs256")?;
/// validate_token(&token, "a-secret-that-is-long-enough-for-hs256")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod invitation_code;
pub mod jwt;
pub mod middleware;
pub mod password;
