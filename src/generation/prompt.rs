use crate::models::GenerationRequest;

/// Design requirements every answer must cover, in the order they are listed to the model.
pub const REQUIREMENTS: [&str; 6] = [
    "Create a detailed Mermaid.js flowchart diagram code representing the architecture. Use strict flowchart direction TB (Top to Bottom) or LR (Left to Right). Include subgraphs for VPCs/VNets, Regions, or Availability Zones to show isolation.",
    "Focus heavily on networking constraints: internal routing, private IPs, peering (VPC/VNet Peering), Hub-and-Spoke topologies, Transit Gateways (AWS), or Virtual WAN (Azure), and secure ingress/egress.",
    "Detail the Load Balancing strategy (Layer 4 vs Layer 7).",
    "Define a Failover and Disaster Recovery (DR) plan (e.g., Multi-AZ, Multi-Region, Pilot Light, Warm Standby).",
    "List the exact Technology Stack.",
    "Provide a step-by-step solution walkthrough.",
];

pub fn build_prompt(request: &GenerationRequest) -> String {
    let requirements: String = REQUIREMENTS
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}\n", i + 1, r))
        .collect();

    format!(
        "You are a Senior Principal Cloud Architect.\n\
         Design a comprehensive cloud solution for the following problem on {provider}.\n\
         \n\
         Problem Description:\n\
         \"{problem}\"\n\
         \n\
         Requirements:\n\
         {requirements}\
         \n\
         The provider field of your answer must be \"{provider}\".\n\
         Output must be valid JSON following the defined schema.\n",
        provider = request.provider(),
        problem = request.problem_description(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;

    #[test]
    fn prompt_embeds_provider_problem_and_requirements() {
        let request = GenerationRequest::new("Latency-sensitive trading gateway", Provider::Azure).unwrap();
        let prompt = build_prompt(&request);

        assert!(prompt.contains("on Azure."));
        assert!(prompt.contains("\"Latency-sensitive trading gateway\""));
        for (i, requirement) in REQUIREMENTS.iter().enumerate() {
            assert!(prompt.contains(&format!("{}. {}", i + 1, requirement)));
        }
        assert!(prompt.contains("Layer 4 vs Layer 7"));
        assert!(prompt.contains("Pilot Light, Warm Standby"));
        assert!(prompt.trim_end().ends_with("Output must be valid JSON following the defined schema."));
    }

    #[test]
    fn problem_text_is_verbatim() {
        let text = "Ingest 50k events/s; keep PII in-region {EU}";
        let request = GenerationRequest::new(text, Provider::Gcp).unwrap();
        assert!(build_prompt(&request).contains(text));
    }
}
