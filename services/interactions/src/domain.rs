// Domain layer modules
pub mod command_definition;
pub mod interaction;
pub mod interaction_response;
pub mod signature_verifier;
pub mod user_record;

// Re-exports
pub use command_definition::{CommandDefinition, CommandOptionDefinition, OptionChoice};
pub use interaction::{CommandInteraction, CommandOption, Interaction, OptionValue};
pub use interaction_response::{ErrorCode, InteractionResponse};
pub use signature_verifier::{
    PublicKeyError, SignatureVerifier, VerificationError, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
pub use user_record::{AttributePatch, AttributeValue, GuardViolation, MinimumGuard, PatchOp, UserRecord};
