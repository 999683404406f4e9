pub mod assignment;
pub mod customer;
pub mod pattern;
pub mod role;
pub mod user;

pub use assignment::{CustomerAssignment, ReplaceAssignments};
pub use customer::{
    CreateCustomer, CreateLink, Customer, CustomerOrganization, DecideLink, LinkStatus, link_id,
};
pub use pattern::{Pattern, PatternParseError, PermissionCode};
pub use role::{
    CreateCustomRole, CustomRole, OverrideInput, RoleCategory, RoleOverride, RoleTemplate,
};
pub use user::{
    AccessScope, CreateUser, ResolvedUser, SetUserOverride, SystemRole, User,
    UserPermissionOverride, validate_tenant_anchor,
};
