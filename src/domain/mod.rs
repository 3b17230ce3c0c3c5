pub mod battery;
pub mod coordination;
pub mod dispatch;
pub mod horizon;
pub mod profile;

pub use battery::*;
pub use coordination::*;
pub use dispatch::*;
pub use horizon::*;
pub use profile::{
    CommunityGeneratorSpec, CommunityTariff, DsoProfile, GeneratorSpec, LoadShiftSpec,
    ProfileError, StaticProfile, UtilityTariff,
};
