//! Composable command scopes.

/// Facts about the caller a scope is checked against.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeContext {
    pub is_private: bool,
    pub is_admin: bool,
}

/// Why a scope rejected the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    PrivateOnly,
    AdminOnly,
}

impl Denied {
    pub fn message(self) -> &'static str {
        match self {
            Self::PrivateOnly => "❌ This command only works in a private chat with me.",
            Self::AdminOnly => "❌ This command is for bot admins only.",
        }
    }
}

/// Predicate evaluated before a command handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Any,
    Private,
    Admin,
    All(Vec<Scope>),
}

impl Scope {
    /// Every scope must pass.
    pub fn all(scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self::All(scopes.into_iter().collect())
    }

    /// Admin command usable only in private chats.
    pub fn private_admin() -> Self {
        Self::all([Self::Private, Self::Admin])
    }

    /// Whether checking this scope needs the admin lookup.
    pub fn needs_admin(&self) -> bool {
        match self {
            Self::Admin => true,
            Self::All(scopes) => scopes.iter().any(Scope::needs_admin),
            Self::Any | Self::Private => false,
        }
    }

    /// First failing predicate, in declaration order.
    pub fn check(&self, ctx: &ScopeContext) -> Result<(), Denied> {
        match self {
            Self::Any => Ok(()),
            Self::Private if ctx.is_private => Ok(()),
            Self::Private => Err(Denied::PrivateOnly),
            Self::Admin if ctx.is_admin => Ok(()),
            Self::Admin => Err(Denied::AdminOnly),
            Self::All(scopes) => scopes.iter().try_for_each(|s| s.check(ctx)),
        }
    }
}
