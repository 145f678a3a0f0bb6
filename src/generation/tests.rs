use super::*;
use crate::index::{Document, ScoredDocument};
use async_trait::async_trait;
use std::sync::Mutex;

/// Returns a canned reply and remembers the prompts it was given
struct ScriptedGenerator {
    reply: Result<String>,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing(error: AssistantError) -> Self {
        Self {
            reply: Err(error),
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::replying(reply)
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(AssistantError::ProviderUnavailable(msg)) => {
                Err(AssistantError::ProviderUnavailable(msg.clone()))
            }
            Err(AssistantError::Index(msg)) => Err(AssistantError::Index(msg.clone())),
            Err(other) => Err(AssistantError::GenerationFailed(other.to_string())),
        }
    }
}

fn clinic_context() -> RetrievalResult {
    RetrievalResult::from(vec![ScoredDocument {
        document: Document::new(
            "x",
            "Nom: Clinic X\nVille: Casablanca\nTéléphone: 0522000000",
        ),
        distance: 0.05,
        score: 0.95,
    }])
}

fn create_answer_generator(
    generator: ScriptedGenerator,
    grounding: GroundingMode,
) -> (AnswerGenerator, Arc<ScriptedGenerator>) {
    let generator = Arc::new(generator);
    let answer_generator = AnswerGenerator::new(
        Arc::clone(&generator) as Arc<dyn Generator>,
        PromptBuilder::default(),
        grounding,
        Duration::from_secs(5),
    );
    (answer_generator, generator)
}

#[tokio::test]
async fn answer_is_trimmed_model_output() {
    let (answer_generator, generator) = create_answer_generator(
        ScriptedGenerator::replying("  Clinic X se trouve à Casablanca.\n"),
        GroundingMode::Advisory,
    );

    let answer = answer_generator
        .answer(
            "Où est Clinic X ?",
            &clinic_context(),
            &[],
            Language::French,
            &CancellationToken::new(),
        )
        .await
        .expect("answer should succeed");

    assert_eq!(answer, "Clinic X se trouve à Casablanca.");
    let prompts = generator.prompts.lock().expect("prompt log poisoned");
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("0522000000"));
    assert!(prompts[0].contains("Question: Où est Clinic X ?"));
}

#[tokio::test]
async fn empty_output_is_generation_failure() {
    let (answer_generator, _) =
        create_answer_generator(ScriptedGenerator::replying(" \n "), GroundingMode::Advisory);

    let result = answer_generator
        .answer("q", &clinic_context(), &[], Language::French, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AssistantError::GenerationFailed(_))));
}

#[tokio::test]
async fn provider_outage_passes_through() {
    let (answer_generator, _) = create_answer_generator(
        ScriptedGenerator::failing(AssistantError::ProviderUnavailable("down".to_string())),
        GroundingMode::Advisory,
    );

    let result = answer_generator
        .answer("q", &clinic_context(), &[], Language::French, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AssistantError::ProviderUnavailable(_))));
}

#[tokio::test]
async fn other_errors_become_generation_failures() {
    let (answer_generator, _) = create_answer_generator(
        ScriptedGenerator::failing(AssistantError::Index("odd".to_string())),
        GroundingMode::Advisory,
    );

    let result = answer_generator
        .answer("q", &clinic_context(), &[], Language::French, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AssistantError::GenerationFailed(_))));
}

#[tokio::test]
async fn slow_generation_times_out() {
    let generator = Arc::new(ScriptedGenerator::slow("trop tard", Duration::from_secs(10)));
    let answer_generator = AnswerGenerator::new(
        generator,
        PromptBuilder::default(),
        GroundingMode::Advisory,
        Duration::from_millis(50),
    );

    let result = answer_generator
        .answer("q", &clinic_context(), &[], Language::French, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AssistantError::GenerationFailed(_))));
}

#[tokio::test]
async fn cancelled_generation_fails_without_calling_model() {
    let (answer_generator, generator) = create_answer_generator(
        ScriptedGenerator::replying("Clinic X"),
        GroundingMode::Advisory,
    );
    let token = CancellationToken::new();
    token.cancel();

    let result = answer_generator
        .answer("q", &clinic_context(), &[], Language::French, &token)
        .await;

    assert!(matches!(result, Err(AssistantError::GenerationFailed(_))));
    assert!(generator.prompts.lock().expect("prompt log poisoned").is_empty());
}

#[tokio::test]
async fn strict_mode_keeps_grounded_answers() {
    let (answer_generator, _) = create_answer_generator(
        ScriptedGenerator::replying("Appelez Clinic X à Casablanca au 0522000000."),
        GroundingMode::Strict,
    );

    let answer = answer_generator
        .answer("q", &clinic_context(), &[], Language::French, &CancellationToken::new())
        .await
        .expect("answer");

    assert_eq!(answer, "Appelez Clinic X à Casablanca au 0522000000.");
}

#[tokio::test]
async fn strict_mode_replaces_unsupported_answers() {
    let (answer_generator, _) = create_answer_generator(
        ScriptedGenerator::replying("La capitale de la France est Paris."),
        GroundingMode::Strict,
    );

    let answer = answer_generator
        .answer(
            "Quelle est la capitale de la France ?",
            &RetrievalResult::empty(),
            &[],
            Language::French,
            &CancellationToken::new(),
        )
        .await
        .expect("answer");

    assert_eq!(answer, Language::French.not_found_phrase());
}

#[tokio::test]
async fn strict_mode_keeps_model_refusals() {
    let (answer_generator, _) = create_answer_generator(
        ScriptedGenerator::replying("I don't have this information in my documents."),
        GroundingMode::Strict,
    );

    let answer = answer_generator
        .answer("q", &RetrievalResult::empty(), &[], Language::English, &CancellationToken::new())
        .await
        .expect("answer");

    assert_eq!(answer, "I don't have this information in my documents.");
}

#[tokio::test]
async fn advisory_mode_returns_answer_unchanged() {
    let (answer_generator, _) = create_answer_generator(
        ScriptedGenerator::replying("La capitale de la France est Paris."),
        GroundingMode::Advisory,
    );

    let answer = answer_generator
        .answer("q", &RetrievalResult::empty(), &[], Language::French, &CancellationToken::new())
        .await
        .expect("answer");

    assert_eq!(answer, "La capitale de la France est Paris.");
}

#[tokio::test]
async fn strict_mode_keeps_refusals_with_typographic_apostrophes() {
    let (answer_generator, _) = create_answer_generator(
        ScriptedGenerator::replying("Je n’ai pas cette information dans mes documents."),
        GroundingMode::Strict,
    );

    let answer = answer_generator
        .answer(
            "Quelle est la capitale de la France ?",
            &clinic_context(),
            &[],
            Language::French,
            &CancellationToken::new(),
        )
        .await
        .expect("answer should succeed");

    assert_eq!(answer, "Je n’ai pas cette information dans mes documents.");
}

#[tokio::test]
async fn condense_without_history_skips_the_model() {
    let (answer_generator, generator) = create_answer_generator(
        ScriptedGenerator::replying("ignored"),
        GroundingMode::Advisory,
    );

    let question = answer_generator
        .condense(
            "  Qu'est-ce que l'anxiété ?  ",
            &[],
            Language::French,
            &CancellationToken::new(),
        )
        .await
        .expect("condense should succeed");

    assert_eq!(question, "Qu'est-ce que l'anxiété ?");
    assert!(generator.prompts.lock().expect("prompt log poisoned").is_empty());
}

#[tokio::test]
async fn condense_returns_the_rewritten_question() {
    let (answer_generator, generator) = create_answer_generator(
        ScriptedGenerator::replying("\n \"Comment traiter l'anxiété ?\"\nexplication superflue"),
        GroundingMode::Advisory,
    );
    let history = [
        Turn::user("Qu'est-ce que l'anxiété ?"),
        Turn::assistant("Un sentiment d'inquiétude persistant."),
    ];

    let question = answer_generator
        .condense(
            "Comment la traiter ?",
            &history,
            Language::French,
            &CancellationToken::new(),
        )
        .await
        .expect("condense should succeed");

    assert_eq!(question, "Comment traiter l'anxiété ?");
    let prompts = generator.prompts.lock().expect("prompt log poisoned");
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].ends_with("Question de suivi: Comment la traiter ?\nQuestion autonome:"));
}

#[tokio::test]
async fn condense_failures_are_generation_failures() {
    let history = [Turn::user("Bonjour"), Turn::assistant("Bonjour !")];

    let (empty, _) =
        create_answer_generator(ScriptedGenerator::replying("  "), GroundingMode::Advisory);
    let result = empty
        .condense("Et ensuite ?", &history, Language::French, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(AssistantError::GenerationFailed(_))));

    let (broken, _) = create_answer_generator(
        ScriptedGenerator::failing(AssistantError::Index("bad".to_string())),
        GroundingMode::Advisory,
    );
    let result = broken
        .condense("Et ensuite ?", &history, Language::French, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(AssistantError::GenerationFailed(_))));
}

#[test]
fn language_parsing() {
    assert_eq!("fr".parse::<Language>().expect("fr"), Language::French);
    assert_eq!(" English ".parse::<Language>().expect("en"), Language::English);
    assert_eq!("AR".parse::<Language>().expect("ar"), Language::Arabic);
    assert!("de".parse::<Language>().is_err());
    assert_eq!(Language::default(), Language::French);
    assert_eq!(Language::Arabic.to_string(), "ar");
}

#[test]
fn grounding_mode_serde() {
    #[derive(serde::Deserialize)]
    struct Wrapper {
        grounding: GroundingMode,
    }

    let parsed: Wrapper = toml::from_str("grounding = \"strict\"").expect("should parse");
    assert_eq!(parsed.grounding, GroundingMode::Strict);
    assert_eq!(GroundingMode::default(), GroundingMode::Advisory);
}
