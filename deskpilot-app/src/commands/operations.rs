use deskpilot_tools::{OperationGroup, OperationRegistry};

pub fn list() {
    let registry = OperationRegistry::new();
    println!("\n🔧 {} operations\n", registry.len());

    for group in OperationGroup::ALL {
        println!("[{}]", group);
        for op in registry.by_group(group) {
            let required: Vec<&str> = op.required_params().collect();
            if required.is_empty() {
                println!("  {:<28} {}", op.name, op.description);
            } else {
                println!(
                    "  {:<28} {} (requires: {})",
                    op.name,
                    op.description,
                    required.join(", ")
                );
            }
        }
        println!();
    }
}
