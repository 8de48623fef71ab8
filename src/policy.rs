pub mod behaviour_policy;
