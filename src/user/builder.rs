//! Typed builder for new users.

use zeroize::Zeroizing;

/// Signup data of a user not stored yet.
pub struct NewUser {
    pub fullname: String,
    pub email: String,
    pub username: String,
    pub password: Zeroizing<String>,
}

/// [`NewUser`] builder.
#[derive(Debug, Clone)]
pub struct UserBuilder<Username, Password> {
    fullname: String,
    email: String,
    username: Username,
    password: Password,
}

/// Value is missing on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Missing;

/// Value is present on [`UserBuilder`].
#[derive(Debug, Clone)]
pub struct Present<T>(pub T);

impl UserBuilder<Missing, Missing> {
    /// Create a new [`UserBuilder`].
    pub fn new() -> Self {
        Self {
            fullname: String::default(),
            email: String::default(),
            username: Missing,
            password: Missing,
        }
    }
}

impl Default for UserBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Password> UserBuilder<Missing, Password> {
    /// Update `username` field on [`UserBuilder`].
    pub fn username(
        self,
        username: impl Into<String>,
    ) -> UserBuilder<Present<String>, Password> {
        UserBuilder {
            fullname: self.fullname,
            email: self.email,
            username: Present(username.into().trim().to_owned()),
            password: self.password,
        }
    }
}

impl<Username> UserBuilder<Username, Missing> {
    /// Update `password` field on [`UserBuilder`].
    pub fn password(
        self,
        password: impl Into<String>,
    ) -> UserBuilder<Username, Present<Zeroizing<String>>> {
        UserBuilder {
            fullname: self.fullname,
            email: self.email,
            username: self.username,
            password: Present(Zeroizing::new(password.into())),
        }
    }
}

impl<Username, Password> UserBuilder<Username, Password> {
    /// Update `fullname` field on [`UserBuilder`].
    pub fn fullname(mut self, fullname: impl ToString) -> Self {
        self.fullname = fullname.to_string().trim().to_owned();
        self
    }

    /// Update `email` field on [`UserBuilder`].
    pub fn email(mut self, email: impl ToString) -> Self {
        self.email = email.to_string().trim().to_lowercase();
        self
    }
}

impl UserBuilder<Present<String>, Present<Zeroizing<String>>> {
    /// Build a [`NewUser`].
    pub fn build(self) -> NewUser {
        NewUser {
            fullname: self.fullname,
            email: self.email,
            username: self.username.0,
            password: self.password.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_normalizes() {
        let user = UserBuilder::new()
            .fullname("  Jane Doe ")
            .email(" Jane@Example.COM")
            .password("hunter22")
            .username(" jane ")
            .build();

        assert_eq!(user.fullname, "Jane Doe");
        assert_eq!(user.email, "jane@example.com");
        assert_eq!(user.username, "jane");
        assert_eq!(user.password.as_str(), "hunter22");
    }
}
