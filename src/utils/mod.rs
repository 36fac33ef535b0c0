pub mod password;

pub use password::{
    generate_secure_token, hash_password, validate_password_strength, verify_password, Password,
    PasswordHashString, PasswordPolicyError,
};
